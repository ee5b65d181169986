//! Probe execution.
//!
//! A probe races the request against the check's timeout. Both sides report
//! through an [`OutcomeLatch`]; whichever delivers first decides the
//! outcome and every later delivery is dropped, so each probe yields
//! exactly one [`Outcome`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use tokio::sync::oneshot;
use tracing::debug;

use uptime_core::{Check, Outcome};

use crate::transport::{HttpClient, Target, http_method};

/// Single-use slot that honors only the first delivered outcome.
#[derive(Debug)]
pub struct OutcomeLatch {
    slot: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl OutcomeLatch {
    /// Create a latch and the receiver its first delivery goes to.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(Self {
            slot: Mutex::new(Some(tx)),
        });
        (latch, rx)
    }

    /// Deliver `outcome`. Returns `false` if an outcome was already delivered.
    pub fn deliver(&self, outcome: Outcome) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // The receiver may be gone if the probe was abandoned; the
                // latch is still spent.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Issues one outbound request per check.
#[derive(Clone)]
pub struct ProbeExecutor {
    client: HttpClient,
}

impl ProbeExecutor {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Probe `check` once. Never retries.
    pub async fn execute(&self, check: &Check) -> Outcome {
        let timeout = Duration::from_secs(u64::from(check.timeout_seconds));
        let (latch, delivered) = OutcomeLatch::new();

        let timer = {
            let latch = Arc::clone(&latch);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                latch.deliver(Outcome::timeout());
            })
        };

        let request = {
            let latch = Arc::clone(&latch);
            let client = self.client.clone();
            let protocol = check.protocol;
            let url = check.url.clone();
            let method = http_method(check.method);
            tokio::spawn(async move {
                let outcome = match Target::parse(protocol, &url) {
                    Ok(target) => {
                        match client.send(&target, method, HeaderMap::new(), Bytes::new()).await {
                            Ok(status) => Outcome::response(status.as_u16()),
                            Err(e) => Outcome::transport_error(e.to_string()),
                        }
                    }
                    Err(e) => Outcome::transport_error(e.to_string()),
                };
                latch.deliver(outcome);
            })
        };

        let outcome = delivered
            .await
            .unwrap_or_else(|_| Outcome::transport_error("probe ended without an outcome"));

        // Whichever side lost the race is no longer needed.
        timer.abort();
        request.abort();

        debug!(
            check_id = %check.id,
            target = %check.target(),
            failure_kind = ?outcome.failure_kind,
            response_code = ?outcome.response_code,
            "probe finished"
        );
        outcome
    }
}

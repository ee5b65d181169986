//! Gather loop: lists every stored check and dispatches its probe.
//!
//! Each gather cycle lists the check collection, validates every record and
//! spawns one probe task per valid check. Probes run concurrently and are
//! never awaited by the cycle itself; a check whose previous probe is still
//! running is skipped until that probe finishes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use uptime_core::CHECKS_COLLECTION;
use uptime_state::RecordStore;

use crate::probe::ProbeExecutor;
use crate::reducer::{OutcomeReducer, Reduction};
use crate::validator::CheckValidator;

/// What one gather cycle did.
#[derive(Debug, Default)]
pub struct GatherReport {
    /// Ids the store listed.
    pub listed: usize,
    /// Records that failed validation.
    pub rejected: usize,
    /// Ids whose record could not be read.
    pub unreadable: usize,
    /// Valid checks skipped because a probe was already in flight.
    pub skipped: usize,
    /// Dispatched probes, by check id.
    pub probes: Vec<(String, JoinHandle<Reduction>)>,
}

impl GatherReport {
    pub fn dispatched(&self) -> usize {
        self.probes.len()
    }
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks a check as probing until dropped.
struct InFlightGuard {
    set: InFlight,
    id: String,
}

impl InFlightGuard {
    fn acquire(set: &InFlight, id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Periodically probes every stored check.
#[derive(Clone)]
pub struct GatherScheduler {
    store: Arc<dyn RecordStore>,
    validator: CheckValidator,
    executor: ProbeExecutor,
    reducer: OutcomeReducer,
    in_flight: InFlight,
    interval: Duration,
}

impl GatherScheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        validator: CheckValidator,
        executor: ProbeExecutor,
        reducer: OutcomeReducer,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            validator,
            executor,
            reducer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            interval,
        }
    }

    /// Number of probes currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run one gather cycle. Returns once every probe has been dispatched.
    pub fn gather_once(&self) -> GatherReport {
        let mut report = GatherReport::default();

        let ids = match self.store.list(CHECKS_COLLECTION) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list checks");
                return report;
            }
        };
        if ids.is_empty() {
            warn!("no checks to process");
            return report;
        }
        report.listed = ids.len();

        for id in ids {
            let record = match self.store.read(CHECKS_COLLECTION, &id) {
                Ok(record) => record,
                Err(e) => {
                    warn!(check_id = %id, error = %e, "could not read check");
                    report.unreadable += 1;
                    continue;
                }
            };

            let check = match self.validator.validate(&record) {
                Ok(check) => check,
                Err(invalid) => {
                    warn!(
                        check_id = %id,
                        fields = ?invalid.failed_fields(),
                        "check is not properly formatted, skipping"
                    );
                    report.rejected += 1;
                    continue;
                }
            };

            let Some(guard) = InFlightGuard::acquire(&self.in_flight, &check.id) else {
                debug!(check_id = %check.id, "previous probe still running, skipping");
                report.skipped += 1;
                continue;
            };

            let executor = self.executor.clone();
            let reducer = self.reducer.clone();
            let check_id = check.id.clone();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                let outcome = executor.execute(&check).await;
                reducer.reduce(&check, record, outcome).await
            });
            report.probes.push((check_id, handle));
        }

        debug!(
            listed = report.listed,
            dispatched = report.dispatched(),
            rejected = report.rejected,
            unreadable = report.unreadable,
            skipped = report.skipped,
            "gather cycle dispatched"
        );
        report
    }

    /// Gather immediately, then every interval, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "gather loop started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Probes report through the reducer; handles are not awaited.
                    drop(self.gather_once());
                }
                _ = shutdown.changed() => {
                    info!("gather loop shutting down");
                    break;
                }
            }
        }
    }
}

//! Periodic archiving of live history logs.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use uptime_core::epoch_millis;
use uptime_logs::{HistoryLog, LogError, Rotation};

/// What one rotation pass did.
#[derive(Debug, Default)]
pub struct RotationReport {
    /// `(log id, archive id)` for each rotated log.
    pub rotated: Vec<(String, String)>,
    /// Empty logs left alone.
    pub skipped: Vec<String>,
    pub failed: Vec<(String, LogError)>,
}

/// Periodically compresses and truncates every live log.
#[derive(Clone)]
pub struct RotationScheduler {
    history: HistoryLog,
    interval: Duration,
}

impl RotationScheduler {
    pub fn new(history: HistoryLog, interval: Duration) -> Self {
        Self { history, interval }
    }

    /// Rotate every live log once, one after another. A failure on one log
    /// does not stop the others.
    pub async fn rotate_once(&self) -> RotationReport {
        let mut report = RotationReport::default();

        let ids = match self.history.list(false).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "could not list logs to rotate");
                return report;
            }
        };
        if ids.is_empty() {
            warn!("no logs to rotate");
            return report;
        }

        for id in ids {
            let archive = format!("{id}-{}", epoch_millis());
            match self.history.rotate(&id, &archive).await {
                Ok(Rotation::Rotated { archive, bytes }) => {
                    info!(log_id = %id, %archive, bytes, "log rotated");
                    report.rotated.push((id, archive));
                }
                Ok(Rotation::Skipped) => report.skipped.push(id),
                Err(e) => {
                    warn!(log_id = %id, error = %e, "log rotation failed");
                    report.failed.push((id, e));
                }
            }
        }

        report
    }

    /// Rotate immediately, then every interval, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "rotation loop started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.rotate_once().await;
                    if !report.failed.is_empty() {
                        warn!(failed = report.failed.len(), "rotation pass finished with failures");
                    }
                }
                _ = shutdown.changed() => {
                    info!("rotation loop shutting down");
                    break;
                }
            }
        }
    }
}

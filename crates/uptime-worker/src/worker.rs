//! Wires the gather and rotation loops together.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use uptime_core::UptimeConfig;
use uptime_logs::HistoryLog;
use uptime_state::RecordStore;

use crate::gather::GatherScheduler;
use crate::notifier::Notifier;
use crate::probe::ProbeExecutor;
use crate::reducer::OutcomeReducer;
use crate::rotation::RotationScheduler;
use crate::transport::HttpClient;
use crate::validator::CheckValidator;

/// The background worker: periodic gathering plus periodic log rotation.
#[derive(Clone)]
pub struct Worker {
    gather: GatherScheduler,
    rotation: RotationScheduler,
}

/// Join handles for the worker's two loops.
pub struct WorkerHandles {
    pub gather: JoinHandle<()>,
    pub rotation: JoinHandle<()>,
}

impl WorkerHandles {
    /// Wait for both loops to exit.
    pub async fn join(self) {
        let _ = self.gather.await;
        let _ = self.rotation.await;
    }
}

impl Worker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        history: HistoryLog,
        notifier: Arc<dyn Notifier>,
        client: HttpClient,
        config: &UptimeConfig,
    ) -> Self {
        let reducer = OutcomeReducer::new(Arc::clone(&store), history.clone(), notifier);
        let gather = GatherScheduler::new(
            store,
            CheckValidator::new(config.checks.clone()),
            ProbeExecutor::new(client),
            reducer,
            config.gather_interval(),
        );
        let rotation = RotationScheduler::new(history, config.rotate_interval());
        Self { gather, rotation }
    }

    pub fn gather(&self) -> &GatherScheduler {
        &self.gather
    }

    pub fn rotation(&self) -> &RotationScheduler {
        &self.rotation
    }

    /// Start both loops. They stop when `shutdown` flips to `true`.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> WorkerHandles {
        info!("uptime worker starting");

        let gather = self.gather.clone();
        let gather_shutdown = shutdown.clone();
        let gather = tokio::spawn(async move { gather.run(gather_shutdown).await });

        let rotation = self.rotation.clone();
        let rotation = tokio::spawn(async move { rotation.run(shutdown).await });

        WorkerHandles { gather, rotation }
    }
}

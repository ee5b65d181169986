//! uptime-worker — the background worker that keeps checks honest.
//!
//! Periodically probes every registered check, reduces each probe's
//! outcome to an up/down state, alerts owners on transitions, and keeps a
//! rotated history of every probe.
//!
//! # Architecture
//!
//! ```text
//! Worker
//!   ├── GatherScheduler (every gather interval, first tick immediate)
//!   │   └── per check: RecordStore::read → CheckValidator
//!   │         └── spawned probe task (skipped while one is in flight)
//!   │               ├── ProbeExecutor::execute() → Outcome (exactly once)
//!   │               └── OutcomeReducer::reduce()
//!   │                     ├── HistoryLog::append(LogRecord)
//!   │                     ├── RecordStore::update(state, lastCheckedAt)
//!   │                     └── Notifier::send() on a committed transition
//!   └── RotationScheduler (daily, first tick immediate)
//!       └── per log: HistoryLog::rotate() (compress, then truncate)
//! ```
//!
//! # Alerting
//!
//! Alerts are edge-triggered: a check that has never been probed has no
//! prior state, so its first probe never alerts. After that an alert is
//! sent exactly when the state flips and the new state was persisted.

pub mod gather;
pub mod notifier;
pub mod probe;
pub mod reducer;
pub mod rotation;
pub mod transport;
pub mod validator;
pub mod worker;

pub use gather::{GatherReport, GatherScheduler};
pub use notifier::{LogNotifier, Notifier, NotifyError, TwilioNotifier};
pub use probe::{OutcomeLatch, ProbeExecutor};
pub use reducer::{OutcomeReducer, Reduction, Transition};
pub use rotation::{RotationReport, RotationScheduler};
pub use transport::{HttpClient, TransportError};
pub use validator::{CheckValidator, FieldError, ValidationReport};
pub use worker::{Worker, WorkerHandles};

//! Outcome reduction.
//!
//! For each outcome: decide the new state, append a history record in the
//! background, persist the check, then alert if the state flipped. An alert
//! is only sent for a transition that was durably stored; a failed update
//! suppresses it and the next gather cycle retries naturally.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use uptime_core::{CHECKS_COLLECTION, Check, CheckState, LogRecord, Outcome, epoch_millis};
use uptime_logs::HistoryLog;
use uptime_state::RecordStore;

use crate::notifier::Notifier;

/// The pure decision for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub new_state: CheckState,
    /// The state flipped on a check that had a previous state to flip from.
    pub alert_warranted: bool,
}

impl Transition {
    pub fn evaluate(check: &Check, outcome: &Outcome) -> Self {
        let up = !outcome.failed
            && outcome
                .response_code
                .is_some_and(|code| check.is_success_code(code));
        let new_state = if up { CheckState::Up } else { CheckState::Down };
        Self {
            new_state,
            alert_warranted: check.has_been_checked() && check.state != new_state,
        }
    }
}

/// What happened while reducing one outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub transition: Transition,
    pub observed_at: u64,
    pub logged: bool,
    pub persisted: bool,
    pub alert_sent: bool,
}

/// Applies outcomes to checks: history, persistence, alerts.
#[derive(Clone)]
pub struct OutcomeReducer {
    store: Arc<dyn RecordStore>,
    history: HistoryLog,
    notifier: Arc<dyn Notifier>,
}

impl OutcomeReducer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        history: HistoryLog,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            history,
            notifier,
        }
    }

    /// Reduce `outcome` for `check`. `record` is the raw stored record the
    /// check was validated from; fields this worker does not own are kept.
    ///
    /// Never fails: every error is logged and reflected in the result.
    pub async fn reduce(&self, check: &Check, record: Value, outcome: Outcome) -> Reduction {
        let transition = Transition::evaluate(check, &outcome);
        let observed_at = epoch_millis();

        // The append runs alongside persistence; its result is only reported.
        let append = self.spawn_log(check, outcome, transition, observed_at);

        let last_checked_at = check
            .last_checked_at
            .map_or(observed_at, |previous| previous.max(observed_at));
        let persisted = match merge_record(record, transition.new_state, last_checked_at) {
            Some(updated) => match self.store.update(CHECKS_COLLECTION, &check.id, &updated) {
                Ok(()) => true,
                Err(e) => {
                    error!(check_id = %check.id, error = %e, "failed to persist check, alert suppressed");
                    false
                }
            },
            None => {
                error!(check_id = %check.id, "stored record is not an object, alert suppressed");
                false
            }
        };

        let mut alert_sent = false;
        if persisted && transition.alert_warranted {
            alert_sent = self.alert(check, transition.new_state).await;
        } else if persisted {
            debug!(check_id = %check.id, state = %transition.new_state, "no state change, no alert");
        }

        let logged = append.await.unwrap_or(false);

        Reduction {
            transition,
            observed_at,
            logged,
            persisted,
            alert_sent,
        }
    }

    fn spawn_log(
        &self,
        check: &Check,
        outcome: Outcome,
        transition: Transition,
        observed_at: u64,
    ) -> JoinHandle<bool> {
        let record = LogRecord {
            check: check.clone(),
            outcome,
            state: transition.new_state,
            alert_raised: transition.alert_warranted,
            observed_at,
        };
        let history = self.history.clone();
        tokio::spawn(async move {
            let id = &record.check.id;
            let line = match record.to_line() {
                Ok(line) => line,
                Err(e) => {
                    warn!(check_id = %id, error = %e, "failed to encode history record");
                    return false;
                }
            };
            match history.append(id, &line).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(check_id = %id, error = %e, "failed to append history record");
                    false
                }
            }
        })
    }

    async fn alert(&self, check: &Check, state: CheckState) -> bool {
        let message = alert_message(check, state);
        match self.notifier.send(&check.owner_id, &message).await {
            Ok(()) => {
                info!(check_id = %check.id, %state, "owner alerted to state change");
                true
            }
            Err(e) => {
                warn!(check_id = %check.id, error = %e, "failed to alert owner");
                false
            }
        }
    }
}

/// Text sent to a check's owner when its state changes.
pub fn alert_message(check: &Check, state: CheckState) -> String {
    format!(
        "Alert: Your check for [{}] {} is currently {state}",
        check.method.as_upper(),
        check.target(),
    )
}

/// Overwrite the worker-owned fields on the stored record. Returns `None`
/// when the record is not a JSON object.
fn merge_record(record: Value, state: CheckState, last_checked_at: u64) -> Option<Value> {
    let Value::Object(mut fields) = record else {
        return None;
    };
    fields.insert("state".to_string(), Value::from(state.as_str()));
    fields.insert("lastCheckedAt".to_string(), Value::from(last_checked_at));
    fields.remove("lastChecked");
    Some(Value::Object(fields))
}

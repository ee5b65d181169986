//! Operator commands: seeding checks and reading history.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use uptime_core::{CHECKS_COLLECTION, UptimeConfig};
use uptime_logs::HistoryLog;
use uptime_state::{RecordStore, StateError};
use uptime_worker::CheckValidator;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub existing: usize,
    pub invalid: usize,
}

/// Validate and create each record. Existing ids are left untouched.
pub fn import_records(
    store: &dyn RecordStore,
    validator: &CheckValidator,
    records: Vec<Value>,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for record in records {
        let check = match validator.validate(&record) {
            Ok(check) => check,
            Err(report) => {
                warn!(%report, "skipping invalid check");
                summary.invalid += 1;
                continue;
            }
        };
        let normalized = serde_json::to_value(&check)?;
        match store.create(CHECKS_COLLECTION, &check.id, &normalized) {
            Ok(()) => {
                info!(check_id = %check.id, target = %check.target(), "check created");
                summary.created += 1;
            }
            Err(StateError::AlreadyExists(_)) => {
                warn!(check_id = %check.id, "check already exists, not overwritten");
                summary.existing += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(summary)
}

pub fn import_checks(
    store: &dyn RecordStore,
    config: &UptimeConfig,
    file: &Path,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let records = match serde_json::from_str::<Value>(&content)? {
        Value::Array(records) => records,
        record => vec![record],
    };
    let validator = CheckValidator::new(config.checks.clone());
    let summary = import_records(store, &validator, records)?;
    println!(
        "created {}, already present {}, invalid {}",
        summary.created, summary.existing, summary.invalid
    );
    Ok(())
}

/// One line per stored check.
pub fn check_lines(
    store: &dyn RecordStore,
    validator: &CheckValidator,
) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for id in store.list(CHECKS_COLLECTION)? {
        let record = store.read(CHECKS_COLLECTION, &id)?;
        let line = match validator.validate(&record) {
            Ok(check) => format!(
                "{id}  {:<4}  [{}] {}",
                check.state.as_str(),
                check.method.as_upper(),
                check.target()
            ),
            Err(report) => format!("{id}  {report}"),
        };
        lines.push(line);
    }
    Ok(lines)
}

pub fn list_checks(store: &dyn RecordStore, config: &UptimeConfig) -> anyhow::Result<()> {
    let validator = CheckValidator::new(config.checks.clone());
    for line in check_lines(store, &validator)? {
        println!("{line}");
    }
    Ok(())
}

pub async fn list_logs(history: &HistoryLog, all: bool) -> anyhow::Result<()> {
    for id in history.list(all).await? {
        println!("{id}");
    }
    Ok(())
}

pub async fn show_log(history: &HistoryLog, id: &str, archive: bool) -> anyhow::Result<()> {
    let contents = if archive {
        history.decompress(id).await?
    } else {
        history.read(id).await?
    };
    print!("{contents}");
    Ok(())
}

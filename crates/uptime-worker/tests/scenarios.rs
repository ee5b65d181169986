//! End-to-end worker scenarios.
//!
//! Checks live in an in-memory record store, history goes to a temp
//! directory, alerts are captured by a recording notifier, and endpoints are
//! plain TCP listeners on localhost.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use uptime_core::{CHECKS_COLLECTION, CheckRules, CheckState, FailureKind, LogRecord, UptimeConfig};
use uptime_logs::HistoryLog;
use uptime_state::{RecordStore, StateStore};
use uptime_worker::{
    CheckValidator, GatherScheduler, HttpClient, Notifier, NotifyError, OutcomeReducer,
    ProbeExecutor, Worker,
};

const CHECK_ID: &str = "abcdefghij0123456789";
const OWNER_ID: &str = "11987654321";

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

struct Env {
    _dir: tempfile::TempDir,
    store: StateStore,
    history: HistoryLog,
    notifier: Arc<RecordingNotifier>,
    gather: GatherScheduler,
}

fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    let history = HistoryLog::open(dir.path()).unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let reducer = OutcomeReducer::new(
        Arc::new(store.clone()),
        history.clone(),
        notifier.clone(),
    );
    let gather = GatherScheduler::new(
        Arc::new(store.clone()),
        CheckValidator::new(CheckRules::default()),
        ProbeExecutor::new(HttpClient::new().unwrap()),
        reducer,
        Duration::from_secs(60),
    );
    Env {
        _dir: dir,
        store,
        history,
        notifier,
        gather,
    }
}

fn check_record(id: &str, url: &str, timeout_seconds: u8) -> Value {
    json!({
        "id": id,
        "ownerId": OWNER_ID,
        "protocol": "http",
        "url": url,
        "method": "get",
        "successCodes": [200],
        "timeoutSeconds": timeout_seconds,
    })
}

/// Answer every request with `status`, after `delay`.
async fn endpoint(status: u16, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {status} Status\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("{addr}/health")
}

/// Accept connections and never answer.
async fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("{addr}/health")
}

fn history_records(raw: &str) -> Vec<LogRecord> {
    raw.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn first_successful_probe_marks_up_without_alert() {
    let env = env();
    let url = endpoint(200, Duration::ZERO).await;
    env.store
        .create(CHECKS_COLLECTION, CHECK_ID, &check_record(CHECK_ID, &url, 2))
        .unwrap();

    let mut report = env.gather.gather_once();
    assert_eq!(report.listed, 1);
    assert_eq!(report.dispatched(), 1);
    let (id, handle) = report.probes.pop().unwrap();
    assert_eq!(id, CHECK_ID);

    let reduction = handle.await.unwrap();
    assert_eq!(reduction.transition.new_state, CheckState::Up);
    assert!(!reduction.transition.alert_warranted);
    assert!(env.notifier.sent().is_empty());

    let stored = env.store.read(CHECKS_COLLECTION, CHECK_ID).unwrap();
    assert_eq!(stored["state"], "up");
    assert!(stored["lastCheckedAt"].as_u64().unwrap() > 0);

    let records = history_records(&env.history.read(CHECK_ID).await.unwrap());
    assert_eq!(records.len(), 1);
    assert!(!records[0].alert_raised);
    assert_eq!(records[0].outcome.response_code, Some(200));
    assert_eq!(records[0].state, CheckState::Up);
}

#[tokio::test]
async fn timeout_after_up_alerts_owner() {
    let env = env();
    let url = silent_endpoint().await;
    let mut record = check_record(CHECK_ID, &url, 1);
    record["state"] = json!("up");
    record["lastCheckedAt"] = json!(1_700_000_000_000u64);
    env.store.create(CHECKS_COLLECTION, CHECK_ID, &record).unwrap();

    let mut report = env.gather.gather_once();
    let (_, handle) = report.probes.pop().unwrap();
    let reduction = handle.await.unwrap();

    assert_eq!(reduction.transition.new_state, CheckState::Down);
    assert!(reduction.alert_sent);

    let sent = env.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, OWNER_ID);
    assert_eq!(
        sent[0].1,
        format!("Alert: Your check for [GET] http://{url} is currently down")
    );

    let records = history_records(&env.history.read(CHECK_ID).await.unwrap());
    assert!(records[0].alert_raised);
    assert_eq!(records[0].check.state, CheckState::Up);
}

#[tokio::test]
async fn silent_endpoint_is_a_timeout() {
    let env = env();
    let url = silent_endpoint().await;
    env.store
        .create(CHECKS_COLLECTION, CHECK_ID, &check_record(CHECK_ID, &url, 2))
        .unwrap();

    let started = tokio::time::Instant::now();
    let mut report = env.gather.gather_once();
    let (_, handle) = report.probes.pop().unwrap();
    let reduction = handle.await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));

    assert_eq!(reduction.transition.new_state, CheckState::Down);
    let records = history_records(&env.history.read(CHECK_ID).await.unwrap());
    assert_eq!(records[0].outcome.failure_kind, FailureKind::Timeout);
    assert!(records[0].outcome.response_code.is_none());
    assert_eq!(
        env.store.read(CHECKS_COLLECTION, CHECK_ID).unwrap()["state"],
        "down"
    );
}

#[tokio::test]
async fn rotated_log_is_listed_with_its_archive() {
    let dir = tempfile::tempdir().unwrap();
    let history = HistoryLog::open(dir.path()).unwrap();
    for n in 0..3 {
        history.append("abc123", &format!("{{\"n\":{n}}}")).await.unwrap();
    }

    let archive = format!("abc123-{}", uptime_core::epoch_millis());
    history.rotate("abc123", &archive).await.unwrap();

    assert_eq!(history.list(false).await.unwrap(), vec!["abc123".to_string()]);
    assert_eq!(
        history.list(true).await.unwrap(),
        vec!["abc123".to_string(), archive.clone()]
    );
    assert_eq!(history.read("abc123").await.unwrap(), "");
    assert_eq!(history.decompress(&archive).await.unwrap().lines().count(), 3);
}

#[tokio::test]
async fn steady_state_never_alerts() {
    let env = env();
    let url = endpoint(200, Duration::ZERO).await;
    env.store
        .create(CHECKS_COLLECTION, CHECK_ID, &check_record(CHECK_ID, &url, 2))
        .unwrap();

    for _ in 0..3 {
        let mut report = env.gather.gather_once();
        let (_, handle) = report.probes.pop().unwrap();
        handle.await.unwrap();
    }

    assert!(env.notifier.sent().is_empty());
    let records = history_records(&env.history.read(CHECK_ID).await.unwrap());
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.state == CheckState::Up && !r.alert_raised));
}

#[tokio::test]
async fn recovery_alerts_once() {
    let env = env();
    let url = endpoint(200, Duration::ZERO).await;
    let mut record = check_record(CHECK_ID, &url, 2);
    record["state"] = json!("down");
    record["lastCheckedAt"] = json!(1_700_000_000_000u64);
    env.store.create(CHECKS_COLLECTION, CHECK_ID, &record).unwrap();

    for _ in 0..2 {
        let mut report = env.gather.gather_once();
        let (_, handle) = report.probes.pop().unwrap();
        handle.await.unwrap();
    }

    let sent = env.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.ends_with("is currently up"));
}

#[tokio::test]
async fn invalid_records_are_skipped() {
    let env = env();
    let url = endpoint(200, Duration::ZERO).await;
    let valid_id = "zzzzzzzzzz0123456789";
    env.store
        .create(CHECKS_COLLECTION, valid_id, &check_record(valid_id, &url, 2))
        .unwrap();

    let mut bad = check_record(CHECK_ID, &url, 9);
    bad["protocol"] = json!("ftp");
    env.store.create(CHECKS_COLLECTION, CHECK_ID, &bad).unwrap();

    let mut report = env.gather.gather_once();
    assert_eq!(report.listed, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.dispatched(), 1);
    let (id, handle) = report.probes.pop().unwrap();
    assert_eq!(id, valid_id);
    handle.await.unwrap();

    // The invalid record is untouched and has no history.
    assert_eq!(env.store.read(CHECKS_COLLECTION, CHECK_ID).unwrap(), bad);
    assert!(env.history.read(CHECK_ID).await.is_err());
}

#[tokio::test]
async fn empty_store_dispatches_nothing() {
    let env = env();
    let report = env.gather.gather_once();
    assert_eq!(report.listed, 0);
    assert_eq!(report.dispatched(), 0);
}

#[tokio::test]
async fn running_probe_is_not_redispatched() {
    let env = env();
    let url = endpoint(200, Duration::from_millis(800)).await;
    env.store
        .create(CHECKS_COLLECTION, CHECK_ID, &check_record(CHECK_ID, &url, 3))
        .unwrap();

    let mut first = env.gather.gather_once();
    assert_eq!(first.dispatched(), 1);
    assert_eq!(env.gather.in_flight(), 1);

    let second = env.gather.gather_once();
    assert_eq!(second.dispatched(), 0);
    assert_eq!(second.skipped, 1);

    let (_, handle) = first.probes.pop().unwrap();
    handle.await.unwrap();
    assert_eq!(env.gather.in_flight(), 0);

    let mut third = env.gather.gather_once();
    assert_eq!(third.dispatched(), 1);
    let (_, handle) = third.probes.pop().unwrap();
    handle.await.unwrap();

    let records = history_records(&env.history.read(CHECK_ID).await.unwrap());
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn unknown_fields_survive_updates() {
    let env = env();
    let url = endpoint(200, Duration::ZERO).await;
    let mut record = check_record(CHECK_ID, &url, 2);
    record["label"] = json!("status page");
    env.store.create(CHECKS_COLLECTION, CHECK_ID, &record).unwrap();

    let mut report = env.gather.gather_once();
    let (_, handle) = report.probes.pop().unwrap();
    handle.await.unwrap();

    let stored = env.store.read(CHECKS_COLLECTION, CHECK_ID).unwrap();
    assert_eq!(stored["label"], "status page");
    assert_eq!(stored["state"], "up");
}

#[tokio::test]
async fn worker_probes_on_start_and_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open_in_memory().unwrap();
    let history = HistoryLog::open(dir.path()).unwrap();
    let url = endpoint(200, Duration::ZERO).await;
    store
        .create(CHECKS_COLLECTION, CHECK_ID, &check_record(CHECK_ID, &url, 2))
        .unwrap();

    let config = UptimeConfig {
        gather_interval_secs: 3600,
        ..UptimeConfig::default()
    };
    let worker = Worker::new(
        Arc::new(store.clone()),
        history.clone(),
        Arc::new(RecordingNotifier::default()),
        HttpClient::new().unwrap(),
        &config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = worker.spawn(shutdown_rx);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = store.read(CHECKS_COLLECTION, CHECK_ID).unwrap();
        if stored["state"] == "up" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "check was never probed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handles.join())
        .await
        .unwrap();
}

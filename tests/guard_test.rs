use bytes::Bytes;
use loki_relay::backup::BackupStore;
use loki_relay::fallback::MemoryFallback;
use loki_relay::sender::{
    DeliveryGuard, PushRequest, PushResponse, Transport, TransportFault,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct RespondWith {
    status: u16,
    body: &'static str,
}

impl RespondWith {
    fn new(status: u16, body: &'static str) -> Self {
        Self { status, body }
    }
}

impl Transport for RespondWith {
    async fn deliver(&self, _request: &PushRequest) -> Result<PushResponse, TransportFault> {
        Ok(PushResponse {
            status: self.status,
            body: Bytes::from_static(self.body.as_bytes()),
        })
    }
}

struct FailWith(&'static str);

impl Transport for FailWith {
    async fn deliver(&self, _request: &PushRequest) -> Result<PushResponse, TransportFault> {
        Err(TransportFault::ConnectionFailed(self.0.to_string()))
    }
}

fn guarded<T: Transport>(
    transport: T,
    dir: &TempDir,
) -> (DeliveryGuard<T>, Arc<MemoryFallback>, PathBuf) {
    let backup_path = dir.path().join("loki_backup.log");
    let fallback = Arc::new(MemoryFallback::new());
    let guard = DeliveryGuard::new(
        transport,
        Arc::new(BackupStore::new(&backup_path)),
        fallback.clone(),
    );
    (guard, fallback, backup_path)
}

fn request(payload: &'static str) -> PushRequest {
    PushRequest {
        batch_id: "batch-under-test".to_string(),
        payload: Bytes::from_static(payload.as_bytes()),
    }
}

fn backup_lines(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn success_is_returned_unchanged_with_no_backup() {
    let dir = tempfile::tempdir().unwrap();
    let (guard, fallback, backup_path) = guarded(RespondWith::new(204, ""), &dir);

    let response = guard.deliver(&request("payload")).await.unwrap();

    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
    assert!(!backup_path.exists());
    assert!(fallback.is_empty());
}

#[tokio::test]
async fn rejection_is_returned_unchanged_and_captured() {
    let dir = tempfile::tempdir().unwrap();
    let (guard, fallback, backup_path) =
        guarded(RespondWith::new(500, "internal error"), &dir);

    let response = guard.deliver(&request("the payload")).await.unwrap();

    // Caller sees exactly what the transport returned.
    assert_eq!(response.status, 500);
    assert_eq!(response.body_text(), "internal error");

    // One record with a parseable timestamp prefix and the original payload.
    let lines = backup_lines(&backup_path);
    assert_eq!(lines.len(), 1);
    let (timestamp, payload) = lines[0].split_once(": ").unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert_eq!(payload, "the payload");

    let messages = fallback.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("500"));
    assert!(messages[0].contains("internal error"));
}

#[tokio::test]
async fn fault_is_reraised_and_captured() {
    let dir = tempfile::tempdir().unwrap();
    let (guard, fallback, backup_path) = guarded(FailWith("connection refused"), &dir);

    let result = guard.deliver(&request("the payload")).await;

    let fault = result.unwrap_err();
    assert!(fault.to_string().contains("connection refused"));

    let lines = backup_lines(&backup_path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("the payload"));

    assert!(
        fallback
            .messages()
            .iter()
            .any(|m| m.contains("connection refused"))
    );
}

#[tokio::test]
async fn guard_matches_unwrapped_transport_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let req = request("payload");

    let bare = RespondWith::new(429, "busy");
    let direct = bare.deliver(&req).await.unwrap();

    let (guard, _, _) = guarded(RespondWith::new(429, "busy"), &dir);
    let through_guard = guard.deliver(&req).await.unwrap();

    assert_eq!(direct, through_guard);
}

#[tokio::test]
async fn one_attempt_means_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let (guard, _, backup_path) = guarded(RespondWith::new(503, "unavailable"), &dir);

    guard.deliver(&request("first")).await.unwrap();
    assert_eq!(backup_lines(&backup_path).len(), 1);

    guard.deliver(&request("second")).await.unwrap();
    assert_eq!(backup_lines(&backup_path).len(), 2);
}

#[tokio::test]
async fn empty_payload_is_not_captured() {
    let dir = tempfile::tempdir().unwrap();
    let (guard, _, backup_path) = guarded(FailWith("timed out"), &dir);

    let result = guard.deliver(&request("")).await;

    assert!(result.is_err());
    assert!(!backup_path.exists());
}

#[tokio::test]
async fn backup_write_failure_never_alters_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file in the way").unwrap();

    let fallback = Arc::new(MemoryFallback::new());
    let guard = DeliveryGuard::new(
        RespondWith::new(500, "internal error"),
        Arc::new(BackupStore::new(blocker.join("backup.log"))),
        fallback.clone(),
    );

    let response = guard.deliver(&request("payload")).await.unwrap();

    assert_eq!(response.status, 500);
    assert_eq!(response.body_text(), "internal error");
    assert!(
        fallback
            .messages()
            .iter()
            .any(|m| m.contains("backup capture failed"))
    );
}

#[tokio::test]
async fn concurrent_failing_deliveries_append_whole_records() {
    let dir = tempfile::tempdir().unwrap();
    let (guard, _, backup_path) = guarded(FailWith("connection reset"), &dir);
    let guard = Arc::new(guard);

    let mut handles = Vec::new();
    for i in 0..50 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            let req = PushRequest {
                batch_id: format!("batch-{i}"),
                payload: Bytes::from(format!("payload-{i}")),
            };
            let result = guard.deliver(&req).await;
            assert!(result.is_err());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let lines = backup_lines(&backup_path);
    assert_eq!(lines.len(), 50);

    let mut seen: Vec<u32> = lines
        .iter()
        .map(|line| {
            let (timestamp, payload) = line.split_once(": ").unwrap();
            assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
            payload.strip_prefix("payload-").unwrap().parse().unwrap()
        })
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..50).collect::<Vec<u32>>());
}

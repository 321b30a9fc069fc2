use loki_relay::app::Config;
use loki_relay::event::{Level, LogEvent};
use loki_relay::fallback::MemoryFallback;
use loki_relay::pipeline::Pipeline;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(endpoint: &str, dir: &Path) -> Config {
    Config {
        endpoint: endpoint.to_string(),
        batch_size: 2,
        queue_limit: 100,
        // Long enough that only the size threshold and the shutdown seal
        // produce batches, keeping assertions deterministic.
        flush_interval_ms: 60_000,
        log_dir: dir.join("logs"),
        backup_path: dir.join("logs").join("loki_backup.log"),
        ..Default::default()
    }
}

fn todays_log(dir: &Path) -> std::path::PathBuf {
    let date = chrono::Utc::now().date_naive().format("%Y-%m-%d");
    dir.join("logs").join(format!("log-{date}.log"))
}

#[tokio::test]
async fn events_reach_both_sinks_when_the_endpoint_accepts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/loki/api/v1/push"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fallback = Arc::new(MemoryFallback::new());
    let pipeline =
        Pipeline::build_with_fallback(&config(&server.uri(), dir.path()), fallback.clone())
            .unwrap();

    pipeline
        .publish(LogEvent::new(Level::Info, "sending logs to Loki and file"))
        .unwrap();
    pipeline
        .publish(LogEvent::new(Level::Error, "error message delivery"))
        .unwrap();

    pipeline.shutdown().await;

    // The remote sink pushed at least one batch.
    let requests = server.received_requests().await.unwrap();
    assert!(!requests.is_empty());
    let body = String::from_utf8_lossy(&requests[0].body).into_owned();
    assert!(body.contains("sending logs to Loki and file"));

    // The file sink wrote the same serialized batch.
    let contents = std::fs::read_to_string(todays_log(dir.path())).unwrap();
    assert!(contents.contains("sending logs to Loki and file"));

    // Nothing failed, so no backup and no fallback noise.
    assert!(!dir.path().join("logs").join("loki_backup.log").exists());
    assert!(fallback.is_empty());

    let stats = pipeline.delivery_stats();
    assert!(stats.successful_requests >= 1);
    assert_eq!(stats.failed_requests, 0);
}

#[tokio::test]
async fn rejected_batches_end_up_in_the_backup_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/loki/api/v1/push"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let fallback = Arc::new(MemoryFallback::new());
    let pipeline =
        Pipeline::build_with_fallback(&config(&server.uri(), dir.path()), fallback.clone())
            .unwrap();

    pipeline
        .publish(LogEvent::new(Level::Warn, "this will be rejected"))
        .unwrap();
    pipeline
        .publish(LogEvent::new(Level::Warn, "so will this"))
        .unwrap();

    pipeline.shutdown().await;

    let backup = std::fs::read_to_string(dir.path().join("logs").join("loki_backup.log")).unwrap();
    let lines: Vec<&str> = backup.lines().collect();
    assert_eq!(lines.len(), 1);
    let (timestamp, payload) = lines[0].split_once(": ").unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert!(payload.contains("this will be rejected"));

    // The primary file sink is unaffected by the remote failure.
    let contents = std::fs::read_to_string(todays_log(dir.path())).unwrap();
    assert!(contents.contains("this will be rejected"));

    assert!(fallback.messages().iter().any(|m| m.contains("500")));
}

#[tokio::test]
async fn shutdown_seals_a_partial_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/loki/api/v1/push"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&server.uri(), dir.path());
    cfg.batch_size = 50;
    cfg.flush_interval_ms = 60_000;
    let pipeline = Pipeline::build(&cfg).unwrap();

    // One event, far below the size threshold and long before any tick.
    pipeline
        .publish(LogEvent::new(Level::Info, "lone event"))
        .unwrap();
    pipeline.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(String::from_utf8_lossy(&requests[0].body).contains("lone event"));
}

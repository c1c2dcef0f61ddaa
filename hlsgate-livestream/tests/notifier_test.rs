// Notifier delivery against an HTTP system of record

mod common;

use std::sync::Arc;
use std::time::Duration;

use hlsgate_core::resilience::{RecordingDelay, RetryPolicy};
use hlsgate_core::StreamStatus;
use hlsgate_livestream::livestream::StreamManager;
use hlsgate_livestream::record::{HttpSystemOfRecord, Notifier};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn notifier(server: &MockServer, delay: Arc<RecordingDelay>) -> Notifier {
    let record = HttpSystemOfRecord::new(server.uri()).unwrap();
    Notifier::new(Arc::new(record), RetryPolicy::linear(3, Duration::from_secs(2))).with_delay(delay)
}

#[tokio::test]
async fn test_success_sends_exactly_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/internal/stream-status"))
        .and(body_json(serde_json::json!({"stream_id": "cam-1", "status": "starting"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let delay = RecordingDelay::new();
    let delivered = notifier(&server, delay.clone())
        .notify("cam-1", StreamStatus::Starting)
        .await
        .unwrap();

    assert!(delivered);
    assert!(delay.recorded().is_empty());
}

#[tokio::test]
async fn test_failing_endpoint_is_tried_three_times_then_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/internal/stream-status"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let delay = RecordingDelay::new();
    let delivered = notifier(&server, delay.clone())
        .notify("cam-1", StreamStatus::Running)
        .await
        .unwrap();

    assert!(!delivered);
    let pauses = delay.recorded();
    assert_eq!(pauses, vec![Duration::from_secs(2), Duration::from_secs(4)]);
    assert!(pauses.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_recovers_on_second_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let delay = RecordingDelay::new();
    assert!(notifier(&server, delay.clone())
        .deliver("cam-1", StreamStatus::Stopped)
        .await);
    assert_eq!(delay.recorded(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_unreachable_record_does_not_fail_start() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("markers")).unwrap();
    let manager = StreamManager::new(
        common::manager_config(dir.path()),
        common::FakeLauncher::new(),
        notifier(&server, RecordingDelay::new()),
    );

    let summary = manager.start("cam-1").await.unwrap();
    assert_eq!(summary.status, StreamStatus::Starting);
    manager.stop("cam-1").await.unwrap();
}

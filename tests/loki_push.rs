use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use request_log_sink::loki::LokiSink;
use request_log_sink::push::PushBatch;
use request_log_sink::shipper::{RemoteShipper, ShipperConfig};
use request_log_sink::sink::{LogSink, SinkError};
use request_log_sink::{LogRecord, Severity};
use std::collections::BTreeMap;
use tokio::time::{sleep, timeout, Duration};

const PUSH_PATH: &str = "/loki/api/v1/push";

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), "orders".to_string())])
}

fn fixed_batch() -> PushBatch {
    let ts = |secs| Utc.timestamp_opt(secs, 0).unwrap();
    PushBatch::from_records(
        &[
            LogRecord::at(ts(1), Severity::Info, "a"),
            LogRecord::at(ts(2), Severity::Error, "boom"),
            LogRecord::at(ts(3), Severity::Info, "b"),
        ],
        &labels(),
    )
}

#[tokio::test]
async fn sink_posts_streams_as_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PUSH_PATH)
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::json!({
            "streams": [
                {
                    "stream": { "app": "orders", "level": "info" },
                    "values": [["1000000000", "a"], ["3000000000", "b"]]
                },
                {
                    "stream": { "app": "orders", "level": "error" },
                    "values": [["2000000000", "boom"]]
                }
            ]
        })))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let sink = LokiSink::new(&format!("{}{}", server.url(), PUSH_PATH), None).unwrap();
    sink.push(&fixed_batch()).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn sink_reports_rejected_push() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", PUSH_PATH)
        .with_status(400)
        .with_body("entry out of order")
        .create_async()
        .await;

    let sink = LokiSink::new(&format!("{}{}", server.url(), PUSH_PATH), None).unwrap();
    let err = sink.push(&fixed_batch()).await.unwrap_err();

    match err {
        SinkError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "entry out of order");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn sink_reports_unreachable_backend() {
    let sink = LokiSink::new("http://127.0.0.1:1/loki/api/v1/push", Some(Duration::from_secs(1))).unwrap();
    let err = sink.push(&fixed_batch()).await.unwrap_err();
    assert!(matches!(err, SinkError::Transport(_)), "{err}");
}

#[tokio::test]
async fn shipper_pushes_full_batch_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PUSH_PATH)
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""stream":\{"app":"orders","level":"info"\}"#.to_string()),
            Matcher::Regex(r#""values":\[\["\d+","a"\],\["\d+","b"\]\]"#.to_string()),
        ]))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let shipper = RemoteShipper::new(ShipperConfig {
        url: format!("{}{}", server.url(), PUSH_PATH),
        batch_size: 2,
        batch_wait: Duration::from_secs(30),
        labels: labels(),
        http_timeout: None,
    })
    .unwrap();

    shipper.enqueue(LogRecord::new(Severity::Info, "a"));
    shipper.enqueue(LogRecord::new(Severity::Info, "b"));

    let pushed = timeout(Duration::from_secs(5), async {
        while !mock.matched_async().await {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(pushed.is_ok(), "timed out before the batch was pushed");

    shipper.shutdown().await;
    mock.assert_async().await;

    let stats = shipper.stats();
    assert_eq!(stats.flushed_batches, 1);
    assert_eq!(stats.shipped_records, 2);
}

#[tokio::test]
async fn failed_pushes_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PUSH_PATH)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let shipper = RemoteShipper::new(ShipperConfig {
        url: format!("{}{}", server.url(), PUSH_PATH),
        batch_size: 1,
        batch_wait: Duration::from_secs(30),
        labels: labels(),
        http_timeout: Some(Duration::from_secs(2)),
    })
    .unwrap();

    for msg in ["one", "two", "three"] {
        shipper.enqueue(LogRecord::new(Severity::Warn, msg));
        sleep(Duration::from_millis(50)).await;
    }
    shipper.shutdown().await;

    mock.assert_async().await;
    let stats = shipper.stats();
    assert_eq!(stats.failed_batches, 3);
    assert_eq!(stats.flushed_batches, 0);
}

//! A debug-level logger installed as the process-wide default, shipping to
//! a live HTTP endpoint. The HTTP client's own events reach the logger here,
//! so this lives in its own binary.

use mockito::{Matcher, Server};
use request_log_sink::{Logger, LoggerConfig, RemoteConfig};
use tokio::time::{sleep, Duration};

const PUSH_PATH: &str = "/loki/api/v1/push";

#[tokio::test]
async fn debug_logger_ships_application_events_only() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", PUSH_PATH)
        .match_body(Matcher::Regex("order placed".to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let logger = Logger::new(LoggerConfig {
        level: "debug".to_string(),
        remote: Some(RemoteConfig {
            enabled: true,
            url: format!("{}{}", server.url(), PUSH_PATH),
            batch_size: 10,
            batch_wait: Duration::from_millis(200),
            ..Default::default()
        }),
        ..Default::default()
    })
    .unwrap();
    logger.install().unwrap();

    tracing::info!("order placed");
    sleep(Duration::from_secs(2)).await;

    mock.assert_async().await;
    let stats = logger.shipper_stats().unwrap();
    assert_eq!(stats.enqueued, 1, "{stats:?}");
    assert_eq!(stats.flushed_batches, 1);
    assert_eq!(stats.failed_batches, 0);

    logger.close().await;
}

use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use request_log_sink::noop_sink::NoopSink;
use request_log_sink::{Logger, LoggerConfig, RemoteConfig};

#[tokio::main]
async fn main() {
    let config = LoggerConfig {
        level: "error".to_string(),
        environment: "load-test".to_string(),
        file_path: Some("target/load/custom_load.log".into()),
        remote: Some(RemoteConfig {
            enabled: true,
            url: "http://127.0.0.1:3100/loki/api/v1/push".to_string(),
            batch_size: 1_000,
            batch_wait: Duration::from_millis(200),
            ..Default::default()
        }),
        ..Default::default()
    };

    // Batches go nowhere; this measures the fan-out and shipper overhead.
    let logger = Logger::builder(config)
        .remote_sink(Arc::new(NoopSink))
        .build()
        .expect("build logger");

    let n: u64 = 100_000;
    let start = Instant::now();

    tracing::dispatcher::with_default(logger.dispatch(), || {
        for i in 0..n {
            error!(iteration = i, "custom load test error");
        }
    });

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    let stats = logger.shipper_stats();
    logger.close().await;
    println!("{:?}", stats);
}

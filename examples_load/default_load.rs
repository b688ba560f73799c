use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use request_log_sink::noop_sink::NoopSink;
use request_log_sink::shipper::{RemoteShipper, ShipperConfig};
use request_log_sink::{LogRecord, Severity};

#[tokio::main]
async fn main() {
    let shipper = RemoteShipper::with_sink(ShipperConfig::default(), Arc::new(NoopSink))
        .expect("start shipper");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        shipper.enqueue(LogRecord::new(Severity::Error, format!("default load test error {}", i)));
        if i % 1_000 == 0 {
            tokio::task::yield_now().await;
        }
    }

    let elapsed = start.elapsed();
    println!("default config: enqueued {} records in {:?} (~{:.0} rec/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    shipper.shutdown().await;
    println!("{:?}", shipper.stats());
}

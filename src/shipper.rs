use crate::loki::{EndpointError, LokiSink};
use crate::push::PushBatch;
use crate::record::LogRecord;
use crate::sink::LogSink;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::instrument::WithSubscriber;
use tracing::subscriber::NoSubscriber;

/// Batch size used when the configured one is zero.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Batch wait used when the configured one is zero.
pub const DEFAULT_BATCH_WAIT: Duration = Duration::from_secs(1);

/// Configuration of a [`RemoteShipper`].
///
/// **Fields**
/// - `url`: push endpoint, e.g. `http://loki:3100/loki/api/v1/push`.
/// - `batch_size`: records per push; `0` means 100. The queue holds twice
///   this many records.
/// - `batch_wait`: longest time a non-empty batch waits; zero means 1s.
/// - `labels`: default labels attached to every stream.
/// - `http_timeout`: client timeout; `None` means 5s.
#[derive(Clone, Debug, Default)]
pub struct ShipperConfig {
    pub url: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub labels: BTreeMap<String, String>,
    pub http_timeout: Option<Duration>,
}

impl ShipperConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ShipperConfig {
            url: url.into(),
            ..Default::default()
        }
    }

    fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.batch_wait.is_zero() {
            self.batch_wait = DEFAULT_BATCH_WAIT;
        }
        self
    }
}

/// Error type returned when constructing a [`RemoteShipper`].
#[derive(thiserror::Error, Debug)]
pub enum ShipperError {
    #[error("remote shipper must be created inside a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    flushed_batches: AtomicU64,
    failed_batches: AtomicU64,
    shipped_records: AtomicU64,
}

/// Point-in-time snapshot of a shipper's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipperStats {
    /// Records accepted into the queue.
    pub enqueued: u64,
    /// Records dropped because the queue was full or already closed.
    pub dropped: u64,
    /// Batches the sink accepted.
    pub flushed_batches: u64,
    /// Batches discarded after a sink error.
    pub failed_batches: u64,
    /// Records contained in accepted batches.
    pub shipped_records: u64,
}

/// Asynchronous, batched, best-effort log shipper.
///
/// Producers call [`enqueue`](Self::enqueue), which never blocks: records go
/// into a bounded queue and are dropped when it is full. A single background
/// task drains the queue, groups records into batches and pushes each batch
/// to the [`LogSink`], flushing when the batch is full, when the batch wait
/// elapses, and once more on shutdown. Failed pushes are reported on stderr
/// and discarded.
pub struct RemoteShipper {
    sender: mpsc::Sender<LogRecord>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    config: ShipperConfig,
}

impl RemoteShipper {
    /// Create a shipper pushing to Loki at `config.url`.
    ///
    /// Must be called from within a Tokio runtime; the background task is
    /// spawned immediately.
    pub fn new(config: ShipperConfig) -> Result<Self, ShipperError> {
        let sink = LokiSink::new(&config.url, config.http_timeout)?;
        Self::with_sink(config, Arc::new(sink))
    }

    /// Create a shipper pushing batches to an arbitrary sink.
    pub fn with_sink(config: ShipperConfig, sink: Arc<dyn LogSink>) -> Result<Self, ShipperError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ShipperError::NoRuntime)?;
        let config = config.normalized();

        let (tx, rx) = mpsc::channel::<LogRecord>(config.batch_size * 2);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            rx,
            shutdown: shutdown_rx,
            sink,
            labels: config.labels.clone(),
            batch_size: config.batch_size,
            batch_wait: config.batch_wait,
            counters: Arc::clone(&counters),
        };
        let handle = runtime.spawn(worker.run());

        Ok(RemoteShipper {
            sender: tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(handle)),
            counters,
            config,
        })
    }

    /// Queue a record for shipping without blocking.
    ///
    /// A full queue drops the record and prints a diagnostic; the caller is
    /// never told.
    pub fn enqueue(&self, record: LogRecord) {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                eprintln!(
                    "log shipper queue full, dropping log entry: {}",
                    record.message.trim_end()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Signal the background task to flush and exit.
    ///
    /// Only the first call has an effect. Records enqueued afterwards are
    /// dropped.
    pub fn stop(&self) {
        let signal = match self.shutdown.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(signal) = signal {
            let _ = signal.send(());
        }
    }

    /// Stop the shipper and wait until its final flush has completed.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                eprintln!("log shipper task failed: {}", e);
            }
        }
    }

    /// Number of records the queue can hold.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Effective configuration after defaults were applied.
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    pub fn stats(&self) -> ShipperStats {
        ShipperStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            flushed_batches: self.counters.flushed_batches.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
            shipped_records: self.counters.shipped_records.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RemoteShipper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sole consumer of the queue and sole owner of the pending batch.
struct Worker {
    rx: mpsc::Receiver<LogRecord>,
    shutdown: oneshot::Receiver<()>,
    sink: Arc<dyn LogSink>,
    labels: BTreeMap<String, String>,
    batch_size: usize,
    batch_wait: Duration,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.batch_wait, self.batch_wait);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut batch: Vec<LogRecord> = Vec::with_capacity(self.batch_size);

        loop {
            tokio::select! {
                biased;

                // A dropped sender counts as a shutdown signal too.
                _ = &mut self.shutdown => {
                    self.rx.close();
                    while let Ok(record) = self.rx.try_recv() {
                        batch.push(record);
                    }
                    for chunk in batch.chunks(self.batch_size) {
                        self.flush(chunk).await;
                    }
                    return;
                }
                received = self.rx.recv() => {
                    let Some(record) = received else {
                        if !batch.is_empty() {
                            self.flush(&batch).await;
                        }
                        return;
                    };
                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        self.flush(&batch).await;
                        batch.clear();
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&batch).await;
                        batch.clear();
                    }
                }
            }
        }
    }

    async fn flush(&self, records: &[LogRecord]) {
        let batch = PushBatch::from_records(records, &self.labels);
        // Events raised while pushing must not be shipped again.
        let push = self.sink.push(&batch).with_subscriber(NoSubscriber::default());
        match push.await {
            Ok(()) => {
                self.counters.flushed_batches.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .shipped_records
                    .fetch_add(records.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                eprintln!("error pushing log batch of {} entries: {}", records.len(), e);
            }
        }
    }
}

use crate::adapter::ShipperMakeWriter;
use crate::encoder::LineFormat;
use crate::record::Severity;
use crate::shipper::{RemoteShipper, ShipperConfig, ShipperError, ShipperStats};
use crate::sink::LogSink;
use std::collections::BTreeMap;
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendCount, AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Environment name that always logs to the console.
pub const DEVELOPMENT: &str = "development";

/// How often the log file rolls over when it has no size limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FileRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl FileRotation {
    fn to_appender(self) -> Rotation {
        match self {
            FileRotation::Minutely => Rotation::MINUTELY,
            FileRotation::Hourly => Rotation::HOURLY,
            FileRotation::Daily => Rotation::DAILY,
            FileRotation::Never => Rotation::NEVER,
        }
    }
}

/// Size limit used by [`FileConfig::default`].
pub const DEFAULT_MAX_FILE_BYTES: usize = 100 * 1024 * 1024;

/// Rotation and retention policy for the log file.
///
/// **Fields**
/// - `max_bytes`: roll over after the write that takes the file past this
///   size, so lines are never split. `0` rolls over on `rotation` instead.
/// - `rotation`: time-based rollover, used only when `max_bytes` is `0`.
/// - `max_files`: rotated files to keep; older ones are deleted.
/// - `max_age`: with a size limit, delete rotated files older than this.
///   Replaces the `max_files` count when set.
/// - `compress`: gzip rotated files (size-based rotation only).
#[derive(Clone, Debug)]
pub struct FileConfig {
    pub max_bytes: usize,
    pub rotation: FileRotation,
    pub max_files: usize,
    pub max_age: Option<Duration>,
    pub compress: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            max_bytes: DEFAULT_MAX_FILE_BYTES,
            rotation: FileRotation::Daily,
            max_files: 5,
            max_age: None,
            compress: true,
        }
    }
}

/// Settings of the remote (Loki) sink.
///
/// **Fields**
/// - `enabled`: the sink is only built when `true` and `url` is non-empty.
/// - `url`, `batch_size`, `batch_wait`, `labels`, `http_timeout`: see
///   [`ShipperConfig`].
/// - `structured_severity`: label streams with the event's own level
///   instead of the level guessed from the rendered line.
#[derive(Clone, Debug, Default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub url: String,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub labels: BTreeMap<String, String>,
    pub http_timeout: Option<Duration>,
    pub structured_severity: bool,
}

impl RemoteConfig {
    fn shipper_config(&self) -> ShipperConfig {
        ShipperConfig {
            url: self.url.clone(),
            batch_size: self.batch_size,
            batch_wait: self.batch_wait,
            labels: self.labels.clone(),
            http_timeout: self.http_timeout,
        }
    }
}

/// Configuration of a [`Logger`].
///
/// **Fields**
/// - `level`: minimum level shared by every sink (`debug`..`fatal`,
///   unknown names mean `info`).
/// - `json_output`: render JSON objects instead of tab-separated lines.
/// - `file_path`: rotating log file used outside development.
/// - `environment`: `development` forces console output.
/// - `file`: rotation policy for `file_path`.
/// - `remote`: optional Loki shipping.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub level: String,
    pub json_output: bool,
    pub file_path: Option<PathBuf>,
    pub environment: String,
    pub file: FileConfig,
    pub remote: Option<RemoteConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            json_output: false,
            file_path: None,
            environment: String::new(),
            file: FileConfig::default(),
            remote: None,
        }
    }
}

/// Error type returned when building a [`Logger`].
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("failed to start remote log shipper: {0}")]
    Shipper(#[from] ShipperError),

    #[error("failed to open log file {path}: {reason}")]
    File { path: PathBuf, reason: String },

    #[error("a global tracing subscriber is already installed")]
    Global(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Multi-sink structured logger.
///
/// Combines a console or rotating file sink and an optional remote sink
/// into one `tracing` dispatcher with a shared minimum level. The logger
/// owns the [`RemoteShipper`] it creates; [`close`](Self::close) stops it.
pub struct Logger {
    dispatch: Dispatch,
    level: Severity,
    shipper: Option<Arc<RemoteShipper>>,
    file_guard: Option<WorkerGuard>,
}

impl Logger {
    /// Build a logger writing console output to stdout.
    ///
    /// Needs a Tokio runtime when remote shipping is enabled.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        Self::builder(config).build()
    }

    /// Info-level console logger without file or remote sinks.
    pub fn default_console() -> Self {
        let config = LoggerConfig::default();
        let level = Severity::parse_or_info(&config.level);
        let console = fmt_layer(BoxMakeWriter::new(std::io::stdout), LineFormat::console());
        Logger {
            dispatch: dispatch(vec![console], level),
            level,
            shipper: None,
            file_guard: None,
        }
    }

    pub fn builder(config: LoggerConfig) -> LoggerBuilder {
        LoggerBuilder {
            config,
            console: BoxMakeWriter::new(std::io::stdout),
            remote_sink: None,
        }
    }

    /// The composed dispatcher, e.g. for `tracing::dispatcher::with_default`.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    /// Whether a remote shipper was configured.
    pub fn has_remote(&self) -> bool {
        self.shipper.is_some()
    }

    pub fn shipper_stats(&self) -> Option<ShipperStats> {
        self.shipper.as_ref().map(|s| s.stats())
    }

    /// Install this logger as the process-wide default.
    ///
    /// Call once at startup, before the first event, and keep the logger
    /// alive until [`close`](Self::close) at shutdown.
    pub fn install(&self) -> Result<(), LoggerError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())?;
        Ok(())
    }

    /// Stop the remote shipper (waiting for its final push), then flush
    /// the file writer.
    pub async fn close(self) {
        if let Some(shipper) = &self.shipper {
            shipper.shutdown().await;
        }
        // Dropping the guard flushes the non-blocking file writer.
        drop(self.file_guard);
    }
}

/// Builder for [`Logger`] with injectable console writer and remote sink.
pub struct LoggerBuilder {
    config: LoggerConfig,
    console: BoxMakeWriter,
    remote_sink: Option<Arc<dyn LogSink>>,
}

impl LoggerBuilder {
    /// Replace stdout as the console destination.
    pub fn console_writer(mut self, writer: BoxMakeWriter) -> Self {
        self.console = writer;
        self
    }

    /// Push remote batches to `sink` instead of Loki over HTTP.
    pub fn remote_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.remote_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Logger, LoggerError> {
        let LoggerBuilder {
            config,
            console,
            remote_sink,
        } = self;

        let level = Severity::parse_or_info(&config.level);
        let format = if config.json_output {
            LineFormat::json()
        } else {
            LineFormat::console()
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut file_guard = None;

        if config.environment == DEVELOPMENT {
            layers.push(fmt_layer(console, format));
        } else if let Some(path) = &config.file_path {
            let (writer, guard) = file_writer(path, &config.file)?;
            layers.push(fmt_layer(writer, format));
            file_guard = Some(guard);
        } else {
            layers.push(fmt_layer(console, format));
        }

        let mut shipper = None;
        if let Some(remote) = config.remote.as_ref().filter(|r| r.enabled && !r.url.trim().is_empty()) {
            let built = match remote_sink {
                Some(sink) => RemoteShipper::with_sink(remote.shipper_config(), sink)?,
                None => RemoteShipper::new(remote.shipper_config())?,
            };
            let built = Arc::new(built);
            let writer = ShipperMakeWriter::new(Arc::clone(&built))
                .with_structured_severity(remote.structured_severity);
            let layer = fmt_layer(BoxMakeWriter::new(writer), format).with_filter(remote_targets());
            layers.push(layer.boxed());
            shipper = Some(built);
        }

        Ok(Logger {
            dispatch: dispatch(layers, level),
            level,
            shipper,
            file_guard,
        })
    }
}

fn fmt_layer(writer: BoxMakeWriter, format: LineFormat) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(writer)
        .boxed()
}

/// Crates the remote layer never ships: the push itself goes through them,
/// so shipping their events would feed every push into the next one.
const TRANSPORT_TARGETS: [&str; 5] = ["hyper", "reqwest", "h2", "rustls", "tokio_rustls"];

fn remote_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::TRACE)
        .with_targets(TRANSPORT_TARGETS.map(|target| (target, LevelFilter::OFF)))
}

fn dispatch(layers: Vec<BoxedLayer>, level: Severity) -> Dispatch {
    let filter = LevelFilter::from_level(level.to_tracing());
    Dispatch::new(Registry::default().with(layers).with(filter))
}

fn file_writer(path: &Path, policy: &FileConfig) -> Result<(BoxMakeWriter, WorkerGuard), LoggerError> {
    let file_error = |reason: String| LoggerError::File {
        path: path.to_path_buf(),
        reason,
    };

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| file_error("path has no file name".to_string()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| file_error(e.to_string()))?;

    let (writer, guard) = if policy.max_bytes > 0 {
        let limit = ContentLimit::BytesSurpassed(policy.max_bytes);
        let compression = if policy.compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        };
        let path = dir.join(file_name);
        match policy.max_age {
            Some(age) => {
                let age = chrono::Duration::from_std(age).map_err(|e| file_error(e.to_string()))?;
                let suffix = AppendTimestamp::default(FileLimit::Age(age));
                tracing_appender::non_blocking(FileRotate::new(
                    path,
                    suffix,
                    limit,
                    compression,
                    #[cfg(unix)]
                    None,
                ))
            }
            None => {
                let suffix = AppendCount::new(policy.max_files.max(1));
                tracing_appender::non_blocking(FileRotate::new(
                    path,
                    suffix,
                    limit,
                    compression,
                    #[cfg(unix)]
                    None,
                ))
            }
        }
    } else {
        let appender = RollingFileAppender::builder()
            .rotation(policy.rotation.to_appender())
            .filename_prefix(file_name)
            .max_log_files(policy.max_files.max(1))
            .build(&dir)
            .map_err(|e| file_error(e.to_string()))?;
        tracing_appender::non_blocking(appender)
    };

    Ok((BoxMakeWriter::new(writer), guard))
}

use crate::record::{LogRecord, Severity};
use crate::shipper::RemoteShipper;
use std::io;
use std::sync::Arc;
use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;

/// Keywords checked by [`infer_severity`], in priority order.
const SEVERITY_KEYWORDS: [(&str, Severity); 5] = [
    ("debug", Severity::Debug),
    ("info", Severity::Info),
    ("warn", Severity::Warn),
    ("error", Severity::Error),
    ("fatal", Severity::Fatal),
];

/// Guess the severity of an already rendered log line.
///
/// The first of `debug`, `info`, `warn`, `error`, `fatal` that occurs
/// anywhere in `line` wins, so `"error while parsing debug flag"` is
/// `debug`. Lines containing none of them are `info`. This is a heuristic
/// over text and will misclassify messages that mention another level; it
/// is kept because existing stream labels depend on it.
pub fn infer_severity(line: &str) -> Severity {
    SEVERITY_KEYWORDS
        .iter()
        .find(|(keyword, _)| line.contains(keyword))
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Info)
}

/// `MakeWriter` that forwards every rendered event to a [`RemoteShipper`].
///
/// Plug it into a `tracing_subscriber::fmt` layer; each formatted event
/// becomes one [`LogRecord`].
#[derive(Clone)]
pub struct ShipperMakeWriter {
    shipper: Arc<RemoteShipper>,
    structured_severity: bool,
}

impl ShipperMakeWriter {
    pub fn new(shipper: Arc<RemoteShipper>) -> Self {
        ShipperMakeWriter {
            shipper,
            structured_severity: false,
        }
    }

    /// Take the severity from the event metadata instead of scanning the
    /// rendered text.
    pub fn with_structured_severity(mut self, enabled: bool) -> Self {
        self.structured_severity = enabled;
        self
    }
}

impl<'a> MakeWriter<'a> for ShipperMakeWriter {
    type Writer = ShipperWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        ShipperWriter::new(&self.shipper)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        let mut writer = ShipperWriter::new(&self.shipper);
        if self.structured_severity {
            writer.severity = Some(Severity::from_tracing(meta.level()));
        }
        writer
    }
}

/// Writer turning each `write` call into one queued [`LogRecord`].
///
/// Writes never fail and always report the full buffer as written, even
/// when the shipper drops the record.
pub struct ShipperWriter<'a> {
    shipper: &'a RemoteShipper,
    severity: Option<Severity>,
}

impl<'a> ShipperWriter<'a> {
    pub fn new(shipper: &'a RemoteShipper) -> Self {
        ShipperWriter {
            shipper,
            severity: None,
        }
    }
}

impl io::Write for ShipperWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let line = String::from_utf8_lossy(buf);
        let severity = self.severity.unwrap_or_else(|| infer_severity(&line));
        let message = line.trim_end_matches(['\n', '\r']);

        self.shipper.enqueue(LogRecord::new(severity, message));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::PushBatch;
    use crate::shipper::ShipperConfig;
    use crate::sink::{LogSink, SinkError};
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn first_keyword_in_priority_order_wins() {
        assert_eq!(infer_severity("error while reading debug flag"), Severity::Debug);
        assert_eq!(infer_severity("fatal: info missing"), Severity::Info);
        assert_eq!(infer_severity("2024-01-01 warn disk almost full"), Severity::Warn);
        assert_eq!(infer_severity("error: connection refused"), Severity::Error);
        assert_eq!(infer_severity("fatal: out of memory"), Severity::Fatal);
    }

    #[test]
    fn lines_without_keywords_default_to_info() {
        assert_eq!(infer_severity(""), Severity::Info);
        assert_eq!(infer_severity("request served in 3ms"), Severity::Info);
        // The scan is case sensitive, matching lowercase level encoders.
        assert_eq!(infer_severity("ERROR upper case"), Severity::Info);
    }

    #[derive(Default)]
    struct Capture(Mutex<Vec<PushBatch>>);

    #[async_trait]
    impl LogSink for Capture {
        async fn push(&self, batch: &PushBatch) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(batch.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn writer_enqueues_trimmed_line_with_inferred_level() {
        let sink = Arc::new(Capture::default());
        let shipper = Arc::new(
            RemoteShipper::with_sink(ShipperConfig::new("http://loki.invalid/push"), sink.clone()).unwrap(),
        );
        let make_writer = ShipperMakeWriter::new(Arc::clone(&shipper));

        let mut writer = make_writer.make_writer();
        let written = writer.write(b"2024-01-01T00:00:00Z warn cache miss\n").unwrap();
        assert_eq!(written, 37);
        assert_eq!(writer.write(b"").unwrap(), 0);

        shipper.shutdown().await;

        let batches = sink.0.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let stream = &batches[0].streams[0];
        assert_eq!(stream.labels["level"], "warn");
        assert_eq!(stream.values[0].1, "2024-01-01T00:00:00Z warn cache miss");
        assert_eq!(shipper.stats().enqueued, 1);
    }
}

use crate::caller::short_path;
use crate::record::Severity;
use chrono::Utc;
use serde_json::{Map, Value};
use std::backtrace::Backtrace;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Event formatter shared by every sink of the [`Logger`](crate::logger::Logger).
///
/// Levels are always rendered in lowercase, which is what the remote
/// adapter's severity scan expects.
///
/// - console: `2024-05-01T10:00:00.000Z\tinfo\tsrc/main.rs:12\tmessage\t{"k":"v"}`
/// - json: `{"caller":..,"level":..,"logger":<target>,"msg":..,"time":..,<fields>}`,
///   plus a `stacktrace` of the logging thread on error events
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormat {
    json: bool,
}

impl LineFormat {
    pub fn console() -> Self {
        LineFormat { json: false }
    }

    pub fn json() -> Self {
        LineFormat { json: true }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let meta = event.metadata();
        let mut fields = Map::new();
        let mut message = None;
        event.record(&mut FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        });

        let time = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let level = Severity::from_tracing(meta.level()).as_str();
        let caller = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => format!("{}:{}", short_path(file), line),
            (Some(file), None) => short_path(file).to_string(),
            _ => meta.target().to_string(),
        };
        let message = message.unwrap_or_default();

        if self.json {
            let mut object = fields;
            object.insert("time".to_string(), Value::String(time));
            object.insert("level".to_string(), Value::String(level.to_string()));
            object.insert("logger".to_string(), Value::String(meta.target().to_string()));
            object.insert("caller".to_string(), Value::String(caller));
            object.insert("msg".to_string(), Value::String(message));
            if *meta.level() == Level::ERROR {
                let trace = Backtrace::force_capture().to_string();
                object.insert("stacktrace".to_string(), Value::String(trace));
            }
            let rendered = serde_json::to_string(&object).map_err(|_| fmt::Error)?;
            writeln!(writer, "{}", rendered)
        } else {
            write!(writer, "{}\t{}\t{}\t{}", time, level, caller, message)?;
            if !fields.is_empty() {
                let rendered = serde_json::to_string(&fields).map_err(|_| fmt::Error)?;
                write!(writer, "\t{}", rendered)?;
            }
            writeln!(writer)
        }
    }
}

/// Collects event fields into a JSON map, pulling `message` out separately.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(format: LineFormat, emit: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(format)
            .with_writer(buffer.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);
        buffer.contents()
    }

    #[test]
    fn console_line_uses_lowercase_level_and_short_caller() {
        let out = capture(LineFormat::console(), || {
            tracing::warn!(order_id = 7, "payment slow");
        });

        let columns: Vec<&str> = out.trim_end().split('\t').collect();
        assert_eq!(columns.len(), 5, "{out}");
        assert_eq!(columns[1], "warn");
        assert!(columns[2].starts_with("src/encoder.rs:"), "{out}");
        assert_eq!(columns[3], "payment slow");
        assert_eq!(columns[4], r#"{"order_id":7}"#);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn json_line_carries_fields_and_metadata() {
        let out = capture(LineFormat::json(), || {
            tracing::error!(user = "bob", retry = true, "login failed");
        });

        let value: Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["level"], "error");
        assert_eq!(value["msg"], "login failed");
        assert_eq!(value["user"], "bob");
        assert_eq!(value["retry"], true);
        assert!(value["logger"].as_str().unwrap().starts_with("request_log_sink"));
        assert!(value["time"].as_str().unwrap().ends_with('Z'));
        assert!(!value["stacktrace"].as_str().unwrap().is_empty());
    }

    #[test]
    fn stacktrace_only_on_error_events() {
        let out = capture(LineFormat::json(), || {
            tracing::warn!("retrying");
        });
        let value: Value = serde_json::from_str(out.trim_end()).unwrap();
        assert!(value.get("stacktrace").is_none());

        let out = capture(LineFormat::console(), || {
            tracing::error!("login failed");
        });
        assert_eq!(out.lines().count(), 1);
        assert!(!out.contains("stacktrace"));
    }
}

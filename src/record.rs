use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Severity of a log entry, ordered by increasing urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// All severities, lowest first.
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Lowercase label used on the wire and in rendered lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    /// Parse a configured level name. Anything unrecognised is `Info`.
    pub fn parse_or_info(value: &str) -> Severity {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Severity::Debug,
            "warn" | "warning" => Severity::Warn,
            "error" => Severity::Error,
            "fatal" => Severity::Fatal,
            _ => Severity::Info,
        }
    }

    /// Closest `tracing` level. `tracing` has no fatal, so it folds into error.
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Severity::Debug => tracing::Level::DEBUG,
            Severity::Info => tracing::Level::INFO,
            Severity::Warn => tracing::Level::WARN,
            Severity::Error | Severity::Fatal => tracing::Level::ERROR,
        }
    }

    pub fn from_tracing(level: &tracing::Level) -> Severity {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rendered line waiting to be shipped.
///
/// Records are created by producers, handed to the shipper queue once and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl LogRecord {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), severity, message)
    }

    pub fn at(timestamp: DateTime<Utc>, severity: Severity, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp,
            severity,
            message: message.into(),
        }
    }

    /// Unix timestamp in nanoseconds, rendered as a decimal string.
    ///
    /// Instants outside the representable nanosecond range fall back to
    /// microsecond precision scaled up.
    pub fn unix_nanos(&self) -> String {
        match self.timestamp.timestamp_nanos_opt() {
            Some(nanos) => nanos.to_string(),
            None => (i128::from(self.timestamp.timestamp_micros()) * 1_000).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn severities_are_ordered_by_urgency() {
        let mut sorted = Severity::ALL;
        sorted.sort();
        assert_eq!(sorted, Severity::ALL);
        assert!(Severity::Debug < Severity::Fatal);
    }

    #[test]
    fn unknown_level_names_parse_as_info() {
        assert_eq!(Severity::parse_or_info("DEBUG"), Severity::Debug);
        assert_eq!(Severity::parse_or_info(" warn "), Severity::Warn);
        assert_eq!(Severity::parse_or_info("fatal"), Severity::Fatal);
        assert_eq!(Severity::parse_or_info("verbose"), Severity::Info);
        assert_eq!(Severity::parse_or_info(""), Severity::Info);
    }

    #[test]
    fn timestamp_renders_as_nanoseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123).unwrap();
        let record = LogRecord::at(ts, Severity::Info, "a");
        assert_eq!(record.unix_nanos(), "1700000000000000123");
    }
}

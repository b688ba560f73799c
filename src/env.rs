//! Environment variable names used by this crate for convenient
//! configuration from microservices.
//!
//! These are purely helpers; the core types remain decoupled from
//! environment access except for the production check.

use std::str::FromStr;
use std::time::Duration;

/// Deployment environment, e.g. `development` or `production`.
pub const APP_ENV: &str = "APP_ENV";

/// Deployment environment for the logger when `APP_ENV` is unset.
pub const LOG_ENVIRONMENT: &str = "LOG_ENVIRONMENT";

/// Fallback salt key for requests that did not set one.
pub const NEW_SALT_KEY: &str = "NEW_SALT_KEY";

/// Minimum level: `debug`, `info`, `warn`, `error` or `fatal`.
pub const LOG_LEVEL: &str = "LOG_LEVEL";

/// `true` to render JSON lines instead of tab-separated console lines.
pub const LOG_JSON: &str = "LOG_JSON";

/// Path of the rotating log file used outside development.
pub const LOG_FILE_PATH: &str = "LOG_FILE_PATH";

/// Number of rotated files to keep.
pub const LOG_FILE_MAX_FILES: &str = "LOG_FILE_MAX_FILES";

/// Size in megabytes at which the log file rolls over; `0` rolls daily.
pub const LOG_FILE_MAX_SIZE_MB: &str = "LOG_FILE_MAX_SIZE_MB";

/// Days to keep rotated files; replaces the file count when set.
pub const LOG_FILE_MAX_AGE_DAYS: &str = "LOG_FILE_MAX_AGE_DAYS";

/// `false` to keep rotated files uncompressed.
pub const LOG_FILE_COMPRESS: &str = "LOG_FILE_COMPRESS";

/// Enables the Loki shipper when `true`.
pub const LOKI_ENABLED: &str = "LOKI_ENABLED";

/// Loki push endpoint, e.g. `http://loki:3100/loki/api/v1/push`.
pub const LOKI_URL: &str = "LOKI_URL";

pub const LOKI_BATCH_SIZE: &str = "LOKI_BATCH_SIZE";

pub const LOKI_BATCH_WAIT_MS: &str = "LOKI_BATCH_WAIT_MS";

pub const LOKI_TIMEOUT_MS: &str = "LOKI_TIMEOUT_MS";

/// Default stream labels as `key=value` pairs separated by commas.
pub const LOKI_LABELS: &str = "LOKI_LABELS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, ignoring it when unset or malformed.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag: `1`, `true`, `yes` and `on` (any case) are true.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key).map(|v| parse_flag(&v)).unwrap_or(false)
}

/// Like [`env_flag`], but `default` when the variable is unset.
pub fn env_flag_or(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| parse_flag(&v)).unwrap_or(default)
}

pub fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Whether `APP_ENV` names a production deployment. Not cached.
pub fn is_production() -> bool {
    std::env::var(APP_ENV).map(|v| is_production_value(&v)).unwrap_or(false)
}

pub fn is_production_value(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("production")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_check_ignores_case() {
        assert!(is_production_value("PRODUCTION"));
        assert!(is_production_value("production"));
        assert!(!is_production_value("staging"));
        assert!(!is_production_value(""));
    }

    #[test]
    fn flags_accept_common_spellings() {
        for yes in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(yes), "{yes}");
        }
        for no in ["0", "false", "", "enabled"] {
            assert!(!parse_flag(no), "{no}");
        }
    }
}

use crate::env::{self, env_flag, env_flag_or, env_millis, env_or, env_parse};
use crate::logger::{FileConfig, LoggerConfig, RemoteConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load `<dir>/.env` into the process environment.
///
/// Variables already present in the environment win over the file. A
/// missing or unreadable file is reported on stderr and otherwise ignored,
/// so services can run on plain environment variables.
///
/// **Returns**
/// - `true` if the file was loaded.
pub fn load(dir: impl AsRef<Path>) -> bool {
    let path = dir.as_ref().join(".env");
    match dotenvy::from_path(&path) {
        Ok(()) => true,
        Err(e) => {
            eprintln!(
                "config file {} could not be loaded ({}), using environment variables only",
                path.display(),
                e
            );
            false
        }
    }
}

/// Parse `key=value` pairs separated by commas. Blank or malformed pairs
/// are skipped; keys and values are trimmed.
pub fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

impl LoggerConfig {
    /// Build a configuration from the variables listed in [`crate::env`].
    ///
    /// Unset or malformed values keep their defaults. The remote section is
    /// present only when `LOKI_ENABLED` is true.
    pub fn from_env() -> Self {
        let defaults = LoggerConfig::default();

        let file_path = std::env::var(env::LOG_FILE_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let file_defaults = FileConfig::default();
        let file = FileConfig {
            max_bytes: env_parse::<usize>(env::LOG_FILE_MAX_SIZE_MB)
                .map(|mb| mb.saturating_mul(1024 * 1024))
                .unwrap_or(file_defaults.max_bytes),
            max_files: env_parse(env::LOG_FILE_MAX_FILES).unwrap_or(file_defaults.max_files),
            max_age: env_parse::<u64>(env::LOG_FILE_MAX_AGE_DAYS)
                .filter(|days| *days > 0)
                .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60))),
            compress: env_flag_or(env::LOG_FILE_COMPRESS, file_defaults.compress),
            ..file_defaults
        };

        let remote = env_flag(env::LOKI_ENABLED).then(|| RemoteConfig {
            enabled: true,
            url: env_or(env::LOKI_URL, ""),
            batch_size: env_parse(env::LOKI_BATCH_SIZE).unwrap_or(0),
            batch_wait: env_millis(env::LOKI_BATCH_WAIT_MS).unwrap_or_default(),
            labels: parse_labels(&env_or(env::LOKI_LABELS, "")),
            http_timeout: env_millis(env::LOKI_TIMEOUT_MS),
            structured_severity: false,
        });

        LoggerConfig {
            level: env_or(env::LOG_LEVEL, &defaults.level),
            json_output: env_flag(env::LOG_JSON),
            file_path,
            environment: environment(),
            file,
            remote,
        }
    }
}

/// `APP_ENV`, or `LOG_ENVIRONMENT` when that is unset or blank.
fn environment() -> String {
    [env::APP_ENV, env::LOG_ENVIRONMENT]
        .iter()
        .map(|key| env_or(key, "").trim().to_ascii_lowercase())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

//! Configuration for the trust store
//!
//! Defaults, environment overrides (`KEYTRUST_<SECTION>_<KEY>`) and TOML
//! files, all validated before use.

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Acceptance database configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Change notification configuration
    pub events: EventsConfig,
}

/// Acceptance database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// How long to keep retrying while the database is busy on open
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,

    /// Wait between open attempts
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,

    /// Engine-level lock wait for each statement
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

/// Change notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it lags
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("openpgp.sqlite"),
            open_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(100),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl StoreConfig {
    /// Default settings for a database at `db_path`
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }
}

impl Config {
    /// Default configuration for a database at `db_path`
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig::at(db_path),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Example: KEYTRUST_STORE_DB_PATH=/home/me/.profile/openpgp.sqlite
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store config
        if let Ok(path) = env::var("KEYTRUST_STORE_DB_PATH") {
            config.store.db_path = PathBuf::from(path);
        }
        if let Some(timeout) = env_duration("KEYTRUST_STORE_OPEN_TIMEOUT")? {
            config.store.open_timeout = timeout;
        }
        if let Some(interval) = env_duration("KEYTRUST_STORE_RETRY_INTERVAL")? {
            config.store.retry_interval = interval;
        }
        if let Some(timeout) = env_duration("KEYTRUST_STORE_BUSY_TIMEOUT")? {
            config.store.busy_timeout = timeout;
        }

        // Logging config
        if let Ok(level) = env::var("KEYTRUST_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("KEYTRUST_LOG_JSON") {
            config.logging.json_format = json.parse().map_err(|e: std::str::ParseBoolError| {
                ConfigError::InvalidValue {
                    var: "KEYTRUST_LOG_JSON",
                    reason: e.to_string(),
                }
            })?;
        }

        // Events config
        if let Ok(capacity) = env::var("KEYTRUST_EVENTS_CAPACITY") {
            config.events.capacity = capacity.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    var: "KEYTRUST_EVENTS_CAPACITY",
                    reason: e.to_string(),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.db_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "db_path must not be empty".to_string(),
            ));
        }

        if self.store.open_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "open_timeout must be greater than 0".to_string(),
            ));
        }

        if self.store.retry_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "retry_interval must be greater than 0".to_string(),
            ));
        }

        if self.events.capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "events capacity must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

fn env_duration(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(value) => parse_duration(var, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| ConfigError::InvalidValue {
        var,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.db_path, PathBuf::from("openpgp.sqlite"));
        assert_eq!(config.store.open_timeout, Duration::from_secs(10));
        assert_eq!(config.store.retry_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.store.retry_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.events.capacity = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.store.db_path = PathBuf::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.store.open_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        // Engine-level lock wait may be disabled
        config = Config::default();
        config.store.busy_timeout = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "INFO".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keytrust.toml");

        let mut config = Config::with_db_path(dir.path().join("trust.sqlite"));
        config.store.open_timeout = Duration::from_secs(3);
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.store.db_path, config.store.db_path);
        assert_eq!(loaded.store.open_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keytrust.toml");
        std::fs::write(&path, "[store]\nopen_timeout = \"2s\"\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.store.open_timeout, Duration::from_secs(2));
        assert_eq!(loaded.store.db_path, PathBuf::from("openpgp.sqlite"));
        assert_eq!(loaded.events.capacity, 64);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keytrust.toml");
        std::fs::write(&path, "[store\nopen_timeout = ").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
    }

    // Process-wide variables: keep every KEYTRUST_* case in this one test
    #[test]
    fn test_from_env() {
        const VARS: &[&str] = &[
            "KEYTRUST_STORE_DB_PATH",
            "KEYTRUST_STORE_OPEN_TIMEOUT",
            "KEYTRUST_STORE_RETRY_INTERVAL",
            "KEYTRUST_STORE_BUSY_TIMEOUT",
            "KEYTRUST_LOG_LEVEL",
            "KEYTRUST_LOG_JSON",
            "KEYTRUST_EVENTS_CAPACITY",
        ];
        let clear = || {
            for var in VARS {
                env::remove_var(var);
            }
        };
        clear();

        env::set_var("KEYTRUST_STORE_DB_PATH", "/tmp/trust.sqlite");
        env::set_var("KEYTRUST_STORE_OPEN_TIMEOUT", "3s");
        env::set_var("KEYTRUST_STORE_RETRY_INTERVAL", "50ms");
        env::set_var("KEYTRUST_STORE_BUSY_TIMEOUT", "0s");
        env::set_var("KEYTRUST_LOG_LEVEL", "debug");
        env::set_var("KEYTRUST_LOG_JSON", "true");
        env::set_var("KEYTRUST_EVENTS_CAPACITY", "8");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/trust.sqlite"));
        assert_eq!(config.store.open_timeout, Duration::from_secs(3));
        assert_eq!(config.store.retry_interval, Duration::from_millis(50));
        assert_eq!(config.store.busy_timeout, Duration::ZERO);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.events.capacity, 8);

        env::set_var("KEYTRUST_EVENTS_CAPACITY", "many");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { var: "KEYTRUST_EVENTS_CAPACITY", .. })
        ));
        env::remove_var("KEYTRUST_EVENTS_CAPACITY");

        env::set_var("KEYTRUST_LOG_JSON", "yes");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { var: "KEYTRUST_LOG_JSON", .. })
        ));
        env::remove_var("KEYTRUST_LOG_JSON");

        env::set_var("KEYTRUST_STORE_OPEN_TIMEOUT", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { var: "KEYTRUST_STORE_OPEN_TIMEOUT", .. })
        ));

        env::set_var("KEYTRUST_STORE_OPEN_TIMEOUT", "0s");
        assert!(matches!(Config::from_env(), Err(ConfigError::ValidationFailed(_))));

        clear();
        let config = Config::from_env().unwrap();
        assert_eq!(config.store.db_path, PathBuf::from("openpgp.sqlite"));
        assert_eq!(config.events.capacity, 64);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("x", "250ms").unwrap(), Duration::from_millis(250));
        assert!(matches!(
            parse_duration("x", "soon"),
            Err(ConfigError::InvalidValue { var: "x", .. })
        ));
    }
}

//! Store configuration.
//!
//! # Responsibility
//! - Load database, retry and logging settings from TOML.
//! - Derive the store collaborators' settings (`SqlDialect`, `RetryPolicy`).
//!
//! # Invariants
//! - Every section is optional; missing keys fall back to defaults.
//! - `validate()` must pass before the config is used to build a store.

use crate::db::{RetryPolicy, SqlDialect};
use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_FILE_NAME: &str = "formstore.sqlite3";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    pub dialect: DialectKind,
}

/// Query template dialects known to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    #[default]
    Sqlite,
    SqlServer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per write, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute log directory. Logging stays off when unset.
    pub dir: Option<PathBuf>,
}

/// Errors from loading or validating a `StoreConfig`.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            dialect: DialectKind::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

impl DialectKind {
    pub fn dialect(self) -> SqlDialect {
        match self {
            Self::Sqlite => SqlDialect::SQLITE,
            Self::SqlServer => SqlDialect::SQL_SERVER,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

impl StoreConfig {
    /// Parses a TOML document. Does not validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    /// Reads, parses and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DialectKind, StoreConfig};
    use crate::db::SqlDialect;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = StoreConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.database.path, PathBuf::from("formstore.sqlite3"));
        assert_eq!(config.database.dialect, DialectKind::Sqlite);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn partial_document_merges_with_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
[database]
dialect = "sql_server"

[retry]
base_delay_ms = 10
"#,
        )
        .expect("partial config should parse");

        assert_eq!(config.database.dialect.dialect(), SqlDialect::SQL_SERVER);
        assert_eq!(config.database.path, PathBuf::from("formstore.sqlite3"));
        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn unknown_dialect_fails_to_parse() {
        let err = StoreConfig::from_toml_str("[database]\ndialect = \"oracle\"\n")
            .expect_err("unknown dialect must be rejected");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = StoreConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = StoreConfig::default();
        config.logging.dir = Some(PathBuf::from("logs/dev"));
        let err = config.validate().expect_err("relative dir must be rejected");
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formstore.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 5\n").unwrap();

        let config = StoreConfig::load(&path).expect("config file should load");
        assert_eq!(config.retry.max_attempts, 5);

        let missing = StoreConfig::load(dir.path().join("missing.toml"))
            .expect_err("missing file must fail");
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}

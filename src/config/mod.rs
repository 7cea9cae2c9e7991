//! Configuration management for shelastic
//!
//! This module handles loading, parsing, and managing configuration from:
//! - Configuration files (TOML format)
//! - Command-line arguments (applied by the CLI layer)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Bulk transfer tuning
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Cluster URL (host names without scheme/port are normalized)
    #[serde(default = "default_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Username for basic authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Bulk transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Records requested per scroll page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Time-to-live of the server-side scroll cursor
    #[serde(default = "default_scroll_ttl")]
    pub scroll_ttl: String,

    /// Capacity of the record channel between producer and sink
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// A bulk request is sent once its body grows past this many bytes
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Copy mode sends a bulk request once more than this many records are buffered
    #[serde(default = "default_copy_batch_records")]
    pub copy_batch_records: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Show a progress bar during transfers
    #[serde(default = "default_progress")]
    pub progress: bool,
}

// Default value functions
fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    20
}

fn default_scroll_ttl() -> String {
    "2m".to_string()
}

fn default_channel_capacity() -> usize {
    50
}

fn default_max_request_bytes() -> usize {
    512 * 1024
}

fn default_copy_batch_records() -> usize {
    100
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

fn default_progress() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout: default_timeout(),
            username: None,
            password: None,
        }
    }
}

impl ConnectionConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            scroll_ttl: default_scroll_ttl(),
            channel_capacity: default_channel_capacity(),
            max_request_bytes: default_max_request_bytes(),
            copy_batch_records: default_copy_batch_records(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            progress: default_progress(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// With an explicit path the file must exist. Without one, the default
    /// location is tried and defaults are used when it is absent.
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shelastic")
            .join("config.toml")
    }

    /// Serialize the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.connection.url.trim().is_empty() {
            return Err(invalid("connection.url", &self.connection.url));
        }
        if self.connection.timeout == 0 {
            return Err(invalid("connection.timeout", "0"));
        }
        let transfer = &self.transfer;
        if transfer.page_size == 0 {
            return Err(invalid("transfer.page_size", "0"));
        }
        if transfer.scroll_ttl.trim().is_empty() {
            return Err(invalid("transfer.scroll_ttl", &transfer.scroll_ttl));
        }
        if transfer.channel_capacity == 0 {
            return Err(invalid("transfer.channel_capacity", "0"));
        }
        if transfer.max_request_bytes == 0 {
            return Err(invalid("transfer.max_request_bytes", "0"));
        }
        if transfer.copy_batch_records == 0 {
            return Err(invalid("transfer.copy_batch_records", "0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ShelasticError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.url, "http://localhost:9200");
        assert_eq!(config.transfer.page_size, 20);
        assert_eq!(config.transfer.scroll_ttl, "2m");
        assert_eq!(config.transfer.channel_capacity, 50);
        assert_eq!(config.transfer.max_request_bytes, 512 * 1024);
        assert_eq!(config.transfer.copy_batch_records, 100);
        assert!(config.display.progress);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [connection]
            url = "http://es.internal:9200"

            [transfer]
            page_size = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.url, "http://es.internal:9200");
        assert_eq!(config.connection.timeout, 30);
        assert_eq!(config.transfer.page_size, 500);
        assert_eq!(config.transfer.scroll_ttl, "2m");
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[transfer]\npage_size = \"many\"").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.transfer.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"\ntimestamps = false").unwrap();
        let config = Config::load_from_file(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.logging.timestamps);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load_from_file(Some(Path::new("/nonexistent/shelastic.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed.transfer.max_request_bytes, config.transfer.max_request_bytes);
    }

    #[test]
    fn test_request_timeout() {
        let config = Config::default();
        assert_eq!(config.connection.request_timeout(), Duration::from_secs(30));
    }
}

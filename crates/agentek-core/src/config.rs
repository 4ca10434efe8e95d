//! Daemon configuration.
//!
//! Configuration is stored in TOML format at `<base>/config.toml`, where the
//! base directory defaults to `~/.agentek`. Every field has a default, so a
//! missing file or a partial file is fine.
//!
//! # Default TOML Output
//!
//! ```toml
//! [daemon]
//! approval_timeout_secs = 60
//! max_connections = 64
//! max_request_bytes = 1048576
//!
//! [client]
//! timeout_secs = 120
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! # file = "~/.agentek/signer.log"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// use agentek_core::config::Config;
///
/// let config: Config = toml::from_str(r#"
/// [daemon]
/// approval_timeout_secs = 30
/// "#).expect("valid TOML");
///
/// assert_eq!(config.daemon.approval_timeout_secs, 30);
/// assert_eq!(config.client.timeout_secs, 120);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Daemon-side settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Client-side settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_approval_timeout() -> u64 {
    60
}

const fn default_max_connections() -> usize {
    64
}

const fn default_max_request_bytes() -> usize {
    1024 * 1024
}

const fn default_client_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Settings for the signing daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Seconds to wait for an operator answer before denying.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,

    /// Maximum number of simultaneous socket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum length of one request line, in bytes.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: default_approval_timeout(),
            max_connections: default_max_connections(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

/// Settings for processes talking to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Seconds to wait for a response before giving up.
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_client_timeout(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Minimum level: `trace`, `debug`, `info`, `warn` or `error`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `pretty`, `json` or `compact`.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional log file; `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Creates a configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a timeout or limit is zero,
    /// or the log level/format is not recognized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.approval_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "daemon.approval_timeout_secs",
                "0",
            ));
        }
        if self.daemon.max_connections == 0 {
            return Err(ConfigError::invalid_value("daemon.max_connections", "0"));
        }
        if self.daemon.max_request_bytes == 0 {
            return Err(ConfigError::invalid_value("daemon.max_request_bytes", "0"));
        }
        if self.client.timeout_secs == 0 {
            return Err(ConfigError::invalid_value("client.timeout_secs", "0"));
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                self.logging.level.clone(),
            ));
        }
        if !matches!(
            self.logging.format.to_lowercase().as_str(),
            "pretty" | "json" | "compact"
        ) {
            return Err(ConfigError::invalid_value(
                "logging.format",
                self.logging.format.clone(),
            ));
        }
        Ok(())
    }

    /// Returns the default configuration as commented TOML.
    #[must_use]
    pub fn default_toml() -> String {
        r#"# agentek signer configuration

[daemon]
# Seconds to wait for an interactive approval before denying
approval_timeout_secs = 60
# Maximum simultaneous socket connections
max_connections = 64
# Maximum length of a single request line, in bytes
max_request_bytes = 1048576

[client]
# Seconds a client waits for the daemon to answer
timeout_secs = 120

[logging]
level = "info"
format = "pretty"
# file = "~/.agentek/signer.log"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.daemon.approval_timeout_secs, 60);
        assert_eq!(config.daemon.max_connections, 64);
        assert_eq!(config.daemon.max_request_bytes, 1024 * 1024);
        assert_eq!(config.client.timeout_secs, 120);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.client.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "client.timeout_secs"
        ));

        let mut config = Config::default();
        config.daemon.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_settings() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut config = Config::default();
        config.logging.file = Some("/tmp/signer.log".to_string());
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}

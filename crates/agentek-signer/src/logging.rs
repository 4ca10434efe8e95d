//! # Logging
//!
//! Structured logging on the `tracing` ecosystem.
//!
//! Console output goes to stderr: stdout belongs to command results, and
//! approval prompts share the terminal with the log. An optional file layer
//! writes a daily-rotated log through a non-blocking appender.
//!
//! ```no_run
//! use agentek_signer::logging::{init_logging, LogConfig, LogLevel};
//!
//! let config = LogConfig {
//!     level: LogLevel::Debug,
//!     ..Default::default()
//! };
//! let _guard = init_logging(&config).expect("logging init");
//! tracing::info!("daemon starting");
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use agentek_core::config::LoggingConfig;
use agentek_core::config_loader::expand_path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Error type for logging initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Failed to create the log file or its directory.
    #[error("failed to create log file: {0}")]
    FileCreation(String),
    /// Failed to install the subscriber.
    #[error("failed to initialize logging: {0}")]
    SubscriberInit(String),
    /// Invalid configuration.
    #[error("invalid log configuration: {0}")]
    InvalidConfig(String),
}

/// Minimum severity that gets logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// trace and above
    Trace,
    /// debug and above
    Debug,
    /// info and above
    #[default]
    Info,
    /// warn and above
    Warn,
    /// error only
    Error,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(LogError::InvalidConfig(format!("unknown log level '{other}'"))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
    /// Single-line, human-readable.
    Compact,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(LogError::InvalidConfig(format!("unknown log format '{other}'"))),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
            Self::Compact => f.write_str("compact"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Minimum level; `RUST_LOG` overrides it when set.
    pub level: LogLevel,
    /// Console format.
    pub format: LogFormat,
    /// Optional log file, rotated daily.
    pub file: Option<PathBuf>,
    /// Include the module target in each line.
    pub include_target: bool,
}

impl LogConfig {
    /// Build from the `[logging]` section of the daemon config.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidConfig`] for an unknown level or format,
    /// or a log file path that cannot be expanded.
    pub fn from_config(config: &LoggingConfig) -> Result<Self, LogError> {
        Ok(Self {
            level: config.level.parse()?,
            format: config.format.parse()?,
            file: config
                .file
                .as_deref()
                .map(expand_path)
                .transpose()
                .map_err(|e| LogError::InvalidConfig(e.to_string()))?,
            include_target: true,
        })
    }
}

/// Keeps the file appender's worker alive; logs are flushed when dropped.
pub struct LogGuard {
    guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("has_file_guard", &self.guard.is_some())
            .finish()
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`LogError`] if the log directory cannot be created or a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard, LogError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .map_err(|e| LogError::InvalidConfig(e.to_string()))?;

    let (file_writer, guard) = match config.file.as_ref() {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)
                .map_err(|e| LogError::FileCreation(format!("{}: {e}", dir.display())))?;
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| LogError::InvalidConfig("invalid log file name".to_string()))?;

            let appender = tracing_appender::rolling::daily(dir, filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    // The file layer always writes JSON so it can be shipped as-is.
    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(config.include_target)
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let target = config.include_target;

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr).with_target(target))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr)
                    .with_target(target),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr).with_target(target))
            .try_init(),
    };
    result.map_err(|e| LogError::SubscriberInit(e.to_string()))?;

    Ok(LogGuard { guard })
}

/// Mask every run of 64 hex digits (with or without `0x`), the shape of a
/// raw private key, so it cannot leak into a log line.
///
/// ```
/// use agentek_signer::logging::redact_sensitive;
///
/// let key = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
/// assert_eq!(redact_sensitive(&format!("bad key 0x{key}")), "bad key 0x4c08***2318");
/// assert_eq!(redact_sensitive("chain 8453"), "chain 8453");
/// ```
#[must_use]
pub fn redact_sensitive(value: &str) -> String {
    const SECRET_HEX_LEN: usize = 64;
    const VISIBLE: usize = 4;

    let mut out = String::with_capacity(value.len());
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        if run.len() == SECRET_HEX_LEN {
            out.push_str(&run[..VISIBLE]);
            out.push_str("***");
            out.push_str(&run[SECRET_HEX_LEN - VISIBLE..]);
        } else {
            out.push_str(run);
        }
        run.clear();
    };

    for c in value.chars() {
        if c.is_ascii_hexdigit() {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// A fresh 32-hex-char id for tying together the log lines of one request.
#[must_use]
pub fn new_correlation_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Map `-v` count to a level: none is warn, then info, debug, trace.
#[must_use]
pub const fn verbosity_to_level(verbosity: u8) -> LogLevel {
    match verbosity {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Compact.to_string(), "compact");
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_config() {
        let config = LoggingConfig {
            level: "debug".into(),
            format: "json".into(),
            file: Some("/tmp/agentek/signer.log".into()),
        };
        let log = LogConfig::from_config(&config).unwrap();
        assert_eq!(log.level, LogLevel::Debug);
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.file, Some(PathBuf::from("/tmp/agentek/signer.log")));
    }

    #[test]
    fn test_redact_only_touches_key_shaped_runs() {
        let key = "ab".repeat(32);
        assert_eq!(redact_sensitive(&key), "abab***abab");
        // 40-hex addresses stay readable
        let address = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";
        assert_eq!(redact_sensitive(address), address);
        // 65 hex digits is not a key
        let longer = "a".repeat(65);
        assert_eq!(redact_sensitive(&longer), longer);
    }

    #[test]
    fn test_correlation_ids() {
        let a = new_correlation_id();
        let b = new_correlation_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(verbosity_to_level(0), LogLevel::Warn);
        assert_eq!(verbosity_to_level(1), LogLevel::Info);
        assert_eq!(verbosity_to_level(2), LogLevel::Debug);
        assert_eq!(verbosity_to_level(9), LogLevel::Trace);
    }
}

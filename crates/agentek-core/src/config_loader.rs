//! Configuration loading and the on-disk layout of the base directory.
//!
//! Everything the signer persists lives under one base directory
//! (default `~/.agentek`, overridable with `AGENTEK_HOME`):
//!
//! | File          | Purpose                              | Mode |
//! |---------------|--------------------------------------|------|
//! | `config.toml` | daemon/client/logging configuration  | -    |
//! | `keyfile.enc` | encrypted key and policy             | 0600 |
//! | `signer.sock` | daemon socket                        | 0600 |
//! | `signer.pid`  | daemon PID, decimal text             | 0600 |
//!
//! # Examples
//!
//! ```no_run
//! use agentek_core::config_loader::ConfigLoader;
//! use std::path::PathBuf;
//!
//! let loader = ConfigLoader::with_base_dir(PathBuf::from("/tmp/agentek"));
//! let config = loader.load().expect("failed to load config");
//! let paths = loader.paths();
//! println!("socket at {}", paths.socket.display());
//! ```

use crate::config::Config;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// The configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// The default base directory name within the home directory.
const BASE_DIR_NAME: &str = ".agentek";

/// Environment variable overriding the base directory.
pub const BASE_DIR_ENV: &str = "AGENTEK_HOME";

/// Keyfile name within the base directory.
pub const KEYFILE_NAME: &str = "keyfile.enc";

/// Socket name within the base directory.
pub const SOCKET_NAME: &str = "signer.sock";

/// PID file name within the base directory.
pub const PID_FILE_NAME: &str = "signer.pid";

/// Resolved locations of the files under a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerPaths {
    /// The base directory itself.
    pub base_dir: PathBuf,
    /// `keyfile.enc`
    pub keyfile: PathBuf,
    /// `signer.sock`
    pub socket: PathBuf,
    /// `signer.pid`
    pub pid_file: PathBuf,
}

impl SignerPaths {
    /// Lays out the files under `base_dir`.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentek_core::config_loader::SignerPaths;
    ///
    /// let paths = SignerPaths::new("/srv/agentek");
    /// assert!(paths.keyfile.ends_with("keyfile.enc"));
    /// assert!(paths.socket.ends_with("signer.sock"));
    /// assert!(paths.pid_file.ends_with("signer.pid"));
    /// ```
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            keyfile: base_dir.join(KEYFILE_NAME),
            socket: base_dir.join(SOCKET_NAME),
            pid_file: base_dir.join(PID_FILE_NAME),
            base_dir,
        }
    }
}

/// Loads and saves `config.toml` under a base directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader for the default base directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDirectory`] if neither `AGENTEK_HOME` is
    /// set nor the home directory can be determined.
    pub fn new() -> Result<Self, ConfigError> {
        let base_dir = default_base_dir()?;
        Ok(Self { base_dir })
    }

    /// Creates a loader with a custom base directory.
    #[must_use]
    pub const fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Returns the path to the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the file layout under the base directory.
    #[must_use]
    pub fn paths(&self) -> SignerPaths {
        SignerPaths::new(&self.base_dir)
    }

    /// Loads configuration, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseFailed`] if the file contains invalid TOML
    /// or fails validation, and [`ConfigError::Io`] if it cannot be read.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::io(format!("failed to read {}", config_path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            ConfigError::parse_failed(format!("invalid TOML in {}: {e}", config_path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration, creating the base directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be written.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        self.ensure_base_dir()?;

        let config_path = self.config_path();
        let toml_str = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::parse_failed(format!("failed to serialize configuration: {e}"))
        })?;

        fs::write(&config_path, toml_str).map_err(|e| {
            ConfigError::io(
                format!("failed to write configuration to {}", config_path.display()),
                e,
            )
        })
    }

    /// Writes the commented default configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be written.
    pub fn write_default(&self) -> Result<(), ConfigError> {
        self.ensure_base_dir()?;

        let config_path = self.config_path();
        fs::write(&config_path, Config::default_toml()).map_err(|e| {
            ConfigError::io(
                format!(
                    "failed to write default configuration to {}",
                    config_path.display()
                ),
                e,
            )
        })
    }

    /// Checks if the configuration file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.config_path().exists()
    }

    fn ensure_base_dir(&self) -> Result<(), ConfigError> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir).map_err(|e| {
                ConfigError::io(
                    format!(
                        "failed to create base directory {}",
                        self.base_dir.display()
                    ),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

/// Expands a leading `~` to the home directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDirectory`] if the path starts with `~` and
/// the home directory cannot be determined.
///
/// # Examples
///
/// ```
/// use agentek_core::config_loader::expand_path;
///
/// let path = expand_path("/etc/agentek").expect("absolute paths never fail");
/// assert_eq!(path.to_string_lossy(), "/etc/agentek");
/// ```
pub fn expand_path(path: &str) -> Result<PathBuf, ConfigError> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(ConfigError::no_home_directory)?;
        Ok(home.join(rest))
    } else if path == "~" {
        dirs::home_dir().ok_or_else(ConfigError::no_home_directory)
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Returns the base directory: `$AGENTEK_HOME` if set, else `~/.agentek`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDirectory`] if the home directory is needed
/// and cannot be determined.
pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(BASE_DIR_ENV).filter(|v| !v.is_empty()) {
        return expand_path(&dir.to_string_lossy());
    }
    let home = dirs::home_dir().ok_or_else(ConfigError::no_home_directory)?;
    Ok(home.join(BASE_DIR_NAME))
}

//! # CLI Argument Definitions
//!
//! - `agentek-signer init [--import] [--force]` - create the keyfile
//! - `agentek-signer start` - unlock the key and run the daemon
//! - `agentek-signer status` - is a daemon running?
//! - `agentek-signer stop` - stop the running daemon
//! - `agentek-signer address` - the running daemon's address
//! - `agentek-signer policy show|set <FILE>` - inspect or replace the policy
//!
//! ## Global Options
//!
//! - `-v, --verbose` - increase verbosity
//! - `--base-dir <DIR>` - base directory (env `AGENTEK_HOME`)
//! - `--log-format <FORMAT>` - pretty, json or compact

use std::path::PathBuf;

use agentek_core::config_loader::{expand_path, ConfigLoader};
use agentek_core::error::ConfigError;
use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// Local key-custody signing daemon.
///
/// Holds one Ethereum key, checks every request against a policy and asks
/// the operator before signing anything the policy flags.
#[derive(Debug, Parser)]
#[command(name = "agentek-signer")]
#[command(author, version, about = "Local key-custody signing daemon")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Base directory holding the keyfile, socket and PID file
    #[arg(long, global = true, env = "AGENTEK_HOME", value_name = "DIR")]
    pub base_dir: Option<String>,

    /// Console log format (defaults to the config file's setting)
    #[arg(long, global = true, value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config loader for the selected base directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDirectory`] if the directory involves
    /// `~` and there is no home directory.
    pub fn loader(&self) -> Result<ConfigLoader, ConfigError> {
        match self.base_dir.as_deref() {
            Some(dir) => Ok(ConfigLoader::with_base_dir(expand_path(dir)?)),
            None => ConfigLoader::new(),
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the encrypted keyfile with the default policy
    Init {
        /// Import an existing hex private key (read from AGENTEK_PRIVATE_KEY
        /// or a hidden prompt) instead of generating one
        #[arg(long)]
        import: bool,

        /// Overwrite an existing keyfile
        #[arg(short, long)]
        force: bool,
    },

    /// Unlock the key and run the daemon in the foreground
    Start,

    /// Show whether a daemon is running
    Status,

    /// Stop the running daemon
    Stop,

    /// Print the running daemon's address
    Address,

    /// Show or replace the signing policy
    Policy {
        /// Policy action to perform
        #[command(subcommand)]
        action: PolicyAction,
    },
}

/// Policy actions.
#[derive(Debug, Clone, Subcommand)]
pub enum PolicyAction {
    /// Decrypt and print the policy as JSON
    Show,

    /// Validate a JSON policy file and re-encrypt the keyfile with it
    Set {
        /// Path to the policy JSON
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_init_flags() {
        let cli = Cli::try_parse_from(["agentek-signer", "init", "--import", "--force"]).unwrap();
        match cli.command {
            Commands::Init { import, force } => assert!(import && force),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_globals() {
        let cli = Cli::try_parse_from([
            "agentek-signer",
            "-vv",
            "status",
            "--base-dir",
            "/tmp/agentek",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.base_dir.as_deref(), Some("/tmp/agentek"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(
            cli.loader().unwrap().base_dir(),
            std::path::Path::new("/tmp/agentek")
        );
    }

    #[test]
    fn test_parse_policy_set() {
        let cli = Cli::try_parse_from(["agentek-signer", "policy", "set", "policy.json"]).unwrap();
        match cli.command {
            Commands::Policy {
                action: PolicyAction::Set { file },
            } => assert_eq!(file, PathBuf::from("policy.json")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["agentek-signer"]).is_err());
    }
}

//! # CLI Command Handlers
//!
//! - [`init`] - create the keyfile
//! - [`start`] - run the daemon
//! - [`status`] - report daemon status
//! - [`stop`] - stop the daemon
//! - [`address`] - ask the daemon for its address
//! - [`policy`] - show or replace the policy
//!
//! Every handler returns `Result<_, CommandError>`; `main` maps the error to
//! an exit code with [`CommandError::exit_code`].

pub mod address;
pub mod exit_codes;
pub mod init;
pub mod policy;
pub mod start;
pub mod status;
pub mod stop;

use std::path::PathBuf;

use agentek_core::error::{ConfigError, PolicyError, SignError, StoreError};

use crate::cli::passphrase::PassphraseError;
use crate::client::ClientError;
use crate::server::{error_codes, DaemonError};

pub use address::AddressCommand;
pub use exit_codes::{EXIT_DENIED, EXIT_ERROR, EXIT_SUCCESS};
pub use init::InitCommand;
pub use policy::PolicyCommand;
pub use start::StartCommand;
pub use status::StatusCommand;
pub use stop::StopCommand;

/// Errors from CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No keyfile yet.
    #[error("no keyfile at {0}. Run 'agentek-signer init' first.")]
    NotInitialized(PathBuf),

    /// A keyfile exists and `--force` was not given.
    #[error("keyfile already exists at {0}. Use --force to overwrite it.")]
    AlreadyInitialized(PathBuf),

    /// The command needs the daemon stopped.
    #[error("daemon is running (pid {0}). Stop it first.")]
    DaemonRunning(u32),

    /// The daemon did not exit after SIGTERM.
    #[error("daemon (pid {0}) did not stop in time")]
    StopTimedOut(u32),

    /// Bad user input.
    #[error("{0}")]
    InvalidInput(String),

    /// Passphrase or secret input failed.
    #[error(transparent)]
    Passphrase(#[from] PassphraseError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Keyfile error, including a failed unlock.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid policy.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Key error.
    #[error(transparent)]
    Sign(#[from] SignError),

    /// Daemon lifecycle error.
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// Error talking to the daemon.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// The process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Client(ClientError::Rpc { code, .. })
                if *code == error_codes::POLICY_DENIED || *code == error_codes::APPROVAL_DENIED =>
            {
                EXIT_DENIED
            }
            _ => EXIT_ERROR,
        }
    }
}

/// Runtime for commands that talk to the daemon.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CommandError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

//! # Start Command
//!
//! Unlock the keyfile and run the daemon in the foreground until SIGINT or
//! SIGTERM.
//!
//! The passphrase is read and the keyfile decrypted before the Tokio
//! runtime exists, so `AGENTEK_PASSPHRASE` is gone from the environment
//! before any worker thread starts.
//!
//! ```bash
//! AGENTEK_PASSPHRASE=... agentek-signer start
//! ```

use std::sync::Arc;

use agentek_core::config::Config;
use agentek_core::config_loader::ConfigLoader;
use agentek_crypto::{decrypt, keyfile_exists, read_keyfile};
use tracing::info;

use super::CommandError;
use crate::cli::passphrase::read_passphrase;
use crate::server::{daemon_status, DaemonOptions, PidStatus, SignerDaemon, TerminalApprover};

/// `agentek-signer start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartCommand;

impl StartCommand {
    /// Run the daemon until it is told to shut down.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotInitialized`] without a keyfile,
    /// [`CommandError::DaemonRunning`] if another daemon holds the PID file,
    /// [`CommandError::Store`] for a wrong passphrase, and daemon errors.
    pub fn run(&self, loader: &ConfigLoader, config: &Config) -> Result<(), CommandError> {
        let paths = loader.paths();
        if !keyfile_exists(&paths.keyfile) {
            return Err(CommandError::NotInitialized(paths.keyfile));
        }
        if let PidStatus::Running(pid) = daemon_status(&paths)? {
            return Err(CommandError::DaemonRunning(pid));
        }

        let passphrase = read_passphrase()?;
        let keyfile = read_keyfile(&paths.keyfile)?;
        let payload = decrypt(&keyfile, &passphrase)?;
        drop(passphrase);
        info!(keyfile = %paths.keyfile.display(), "keyfile unlocked");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("agentek-worker")
            .build()?;

        let daemon_config = config.daemon.clone();
        runtime.block_on(async move {
            let approver = TerminalApprover::stdin()?;
            let options = DaemonOptions::from_config(paths, Arc::new(approver), &daemon_config);
            let daemon = SignerDaemon::new(payload, options)?;
            let started = daemon.start()?;

            println!("Address: {}", started.address);
            println!("Socket:  {}", started.socket_path.display());
            println!("PID:     {}", started.pid);
            eprintln!("Press Ctrl+C to stop.");

            daemon.wait_for_shutdown_signal().await?;
            Ok::<_, CommandError>(())
        })
    }
}

//! # Stop Command
//!
//! Sends SIGTERM to the daemon named in the PID file and waits for it to
//! exit. The daemon removes its own socket and PID file on the way out;
//! anything it leaves behind is cleaned up here.

use std::time::{Duration, Instant};

use agentek_core::config_loader::{ConfigLoader, SignerPaths};
use tracing::{debug, info};

use super::CommandError;
use crate::server::daemon_status;
use crate::server::pidfile::{is_process_alive, remove_file_if_exists, terminate};
use crate::server::PidStatus;

/// How long to wait for the daemon to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `agentek-signer stop`.
#[derive(Debug, Clone, Copy)]
pub struct StopCommand {
    /// How long to wait after SIGTERM.
    pub timeout: Duration,
}

impl Default for StopCommand {
    fn default() -> Self {
        Self {
            timeout: STOP_TIMEOUT,
        }
    }
}

impl StopCommand {
    /// Stop the daemon. Returns the PID that was stopped, or `None` if
    /// nothing was running.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::StopTimedOut`] if the process outlives the
    /// timeout, and I/O errors from signalling or cleanup.
    pub fn run(&self, loader: &ConfigLoader) -> Result<Option<u32>, CommandError> {
        let paths = loader.paths();

        let pid = match daemon_status(&paths)? {
            PidStatus::Running(pid) => pid,
            PidStatus::NotRunning => {
                remove_file_if_exists(&paths.socket)?;
                println!("Daemon is not running");
                return Ok(None);
            }
        };

        info!(pid, "sending SIGTERM to daemon");
        terminate(pid)?;

        let deadline = Instant::now() + self.timeout;
        while is_process_alive(pid) {
            if Instant::now() >= deadline {
                return Err(CommandError::StopTimedOut(pid));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        cleanup(&paths)?;
        println!("Daemon stopped (pid {pid})");
        Ok(Some(pid))
    }
}

fn cleanup(paths: &SignerPaths) -> Result<(), CommandError> {
    // Clears a PID file left by a daemon that died without cleaning up.
    if daemon_status(paths)?.is_running() {
        return Ok(());
    }
    if paths.socket.exists() {
        debug!(socket = %paths.socket.display(), "removing leftover socket");
        remove_file_if_exists(&paths.socket)?;
    }
    Ok(())
}

//! # Status Command
//!
//! Reports whether a daemon is running, based on the PID file. A stale PID
//! file is removed as a side effect.

use agentek_core::config_loader::ConfigLoader;

use super::CommandError;
use crate::server::{daemon_status, PidStatus};

/// `agentek-signer status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCommand;

impl StatusCommand {
    /// Print and return the daemon status.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Daemon`] if the PID file cannot be read.
    pub fn run(&self, loader: &ConfigLoader) -> Result<PidStatus, CommandError> {
        let paths = loader.paths();
        let status = daemon_status(&paths)?;
        match status {
            PidStatus::Running(pid) => {
                println!("Daemon is running (pid {pid})");
                println!("Socket: {}", paths.socket.display());
            }
            PidStatus::NotRunning => println!("Daemon is not running"),
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::server::pidfile::write_pid;
    use tempfile::TempDir;

    #[test]
    fn test_not_running_without_pid_file() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_base_dir(temp.path().to_path_buf());
        assert_eq!(StatusCommand.run(&loader).unwrap(), PidStatus::NotRunning);
    }

    #[test]
    fn test_running_for_live_pid() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_base_dir(temp.path().to_path_buf());
        write_pid(&loader.paths().pid_file, std::process::id()).unwrap();

        assert_eq!(
            StatusCommand.run(&loader).unwrap(),
            PidStatus::Running(std::process::id())
        );
    }

    #[test]
    fn test_stale_pid_file_is_removed() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_base_dir(temp.path().to_path_buf());
        let pid_file = loader.paths().pid_file;
        std::fs::write(&pid_file, "garbage\n").unwrap();

        assert_eq!(StatusCommand.run(&loader).unwrap(), PidStatus::NotRunning);
        assert!(!pid_file.exists());
    }
}

//! PID file handling.
//!
//! The PID file is the only record of a running daemon. Liveness is probed
//! with signal 0; a file naming a dead process is stale and gets removed by
//! whoever notices.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use tracing::{debug, warn};

/// Mode of the PID file.
pub const PID_FILE_MODE: u32 = 0o600;

/// What the PID file says about the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidStatus {
    /// A live process holds the PID file.
    Running(u32),
    /// No PID file, or a stale one that has now been removed.
    NotRunning,
}

impl PidStatus {
    /// Returns true for [`PidStatus::Running`].
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// The live PID, if any.
    #[must_use]
    pub const fn pid(self) -> Option<u32> {
        match self {
            Self::Running(pid) => Some(pid),
            Self::NotRunning => None,
        }
    }
}

/// Read the PID recorded in `path`.
///
/// Returns `Ok(None)` when the file is missing or does not hold a PID.
///
/// # Errors
///
/// Returns other I/O errors from reading the file.
pub fn read_pid(path: &Path) -> io::Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok().filter(|pid| *pid > 0)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write `pid` to `path` with owner-only permissions.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be written.
pub fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(PID_FILE_MODE);

    let mut file = options.open(path)?;
    writeln!(file, "{pid}")?;

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(PID_FILE_MODE))?;

    debug!(pid, path = %path.display(), "pid file written");
    Ok(())
}

/// Remove `path` if it exists.
///
/// # Errors
///
/// Returns I/O errors other than the file being absent.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recompute the daemon status from the PID file, removing it if stale.
///
/// # Errors
///
/// Returns I/O errors from reading or removing the file.
pub fn check_pid_file(path: &Path) -> io::Result<PidStatus> {
    if !path.exists() {
        return Ok(PidStatus::NotRunning);
    }

    match read_pid(path)? {
        Some(pid) if is_process_alive(pid) => Ok(PidStatus::Running(pid)),
        stale => {
            warn!(pid = ?stale, path = %path.display(), "removing stale pid file");
            remove_file_if_exists(path)?;
            Ok(PidStatus::NotRunning)
        }
    }
}

/// Returns true if a process with `pid` exists.
///
/// A permission error still means the process exists.
#[must_use]
pub fn is_process_alive(pid: u32) -> bool {
    match send_signal(pid, 0) {
        Ok(()) => true,
        Err(e) => e.raw_os_error() == Some(libc::EPERM),
    }
}

/// Ask the process to shut down with SIGTERM.
///
/// # Errors
///
/// Returns the OS error from `kill(2)`.
pub fn terminate(pid: u32) -> io::Result<()> {
    send_signal(pid, libc::SIGTERM)
}

fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if pid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "pid must be positive"));
    }

    // SAFETY: kill(2) takes plain integers and touches no memory we own. The
    // pid is positive, so it can never address a process group.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

//! The signing daemon.
//!
//! [`SignerDaemon`] owns the listener, the PID file and the
//! [`RequestHandler`]. Lifecycle:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! Each connection is read line by line. Every complete line is handled on
//! its own task and its response is written as soon as it is ready, so a
//! `ping` sent after a sign request that waits on the operator is answered
//! first. Clients pair responses with requests by `id`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentek_core::SignerPaths;
//! use agentek_core::types::PolicyConfig;
//! use agentek_crypto::{DecryptedPayload, SecretKey};
//! use agentek_signer::server::{DaemonOptions, SignerDaemon, TerminalApprover};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let payload = DecryptedPayload {
//!         private_key: SecretKey::generate(),
//!         policy: PolicyConfig::default(),
//!     };
//!     let options = DaemonOptions::new(
//!         SignerPaths::new("/tmp/agentek"),
//!         Arc::new(TerminalApprover::stdin()?),
//!     );
//!     let daemon = SignerDaemon::new(payload, options)?;
//!     let info = daemon.start()?;
//!     println!("signing as {} on {}", info.address, info.socket_path.display());
//!     daemon.wait_for_shutdown_signal().await?;
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agentek_core::config::DaemonConfig;
use agentek_core::error::{PolicyError, SignError};
use agentek_core::SignerPaths;
use agentek_crypto::DecryptedPayload;
use alloy_primitives::Address;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::approval::Approver;
use super::handler::RequestHandler;
use super::pidfile::{self, PidStatus};
use super::protocol::{JsonRpcError, JsonRpcId, JsonRpcResponse};

/// Mode of the socket file.
pub const SOCKET_MODE: u32 = 0o600;

/// Backoff after an accept error.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle state of a [`SignerDaemon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Not serving.
    Stopped,
    /// Binding the socket and writing the PID file.
    Starting,
    /// Accepting connections.
    Running,
    /// Closing the socket and removing files.
    Stopping,
}

/// What `start` reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartInfo {
    /// Address of the loaded key.
    pub address: Address,
    /// Where the daemon listens.
    pub socket_path: PathBuf,
    /// PID written to the PID file.
    pub pid: u32,
}

/// Daemon settings.
#[derive(Clone)]
pub struct DaemonOptions {
    /// Socket, PID file and keyfile locations.
    pub paths: SignerPaths,
    /// Who approves flagged requests.
    pub approver: Arc<dyn Approver>,
    /// How long one approval may wait.
    pub approval_timeout: Duration,
    /// Maximum simultaneous connections.
    pub max_connections: usize,
    /// Maximum length of one request line, in bytes.
    pub max_request_bytes: usize,
}

impl std::fmt::Debug for DaemonOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonOptions")
            .field("paths", &self.paths)
            .field("approval_timeout", &self.approval_timeout)
            .field("max_connections", &self.max_connections)
            .field("max_request_bytes", &self.max_request_bytes)
            .finish_non_exhaustive()
    }
}

impl DaemonOptions {
    /// Options with the default limits.
    #[must_use]
    pub fn new(paths: SignerPaths, approver: Arc<dyn Approver>) -> Self {
        Self::from_config(paths, approver, &DaemonConfig::default())
    }

    /// Options with limits from the `[daemon]` config section.
    #[must_use]
    pub fn from_config(
        paths: SignerPaths,
        approver: Arc<dyn Approver>,
        config: &DaemonConfig,
    ) -> Self {
        Self {
            paths,
            approver,
            approval_timeout: Duration::from_secs(config.approval_timeout_secs),
            max_connections: config.max_connections,
            max_request_bytes: config.max_request_bytes,
        }
    }

    /// Override the approval timeout.
    #[must_use]
    pub const fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }
}

/// Errors from the daemon lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Another live process holds the PID file.
    #[error("daemon already running (pid {pid})")]
    AlreadyRunning {
        /// PID recorded in the PID file.
        pid: u32,
    },

    /// `start` was called on a daemon that is not stopped.
    #[error("daemon is {0:?}, not stopped")]
    InvalidState(DaemonState),

    /// The loaded key is unusable.
    #[error("cannot load signing key: {0}")]
    Key(#[from] SignError),

    /// The loaded policy is invalid.
    #[error("cannot load policy: {0}")]
    Policy(#[from] PolicyError),

    /// Failed to bind the socket.
    #[error("failed to bind socket at {path}: {source}")]
    Bind {
        /// The socket path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to restrict the socket.
    #[error("failed to set socket permissions on {path}: {source}")]
    Permissions {
        /// The socket path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write the PID file.
    #[error("pid file {path}: {source}")]
    PidFile {
        /// The PID file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Signal handler registration failed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Removes the socket file when dropped.
struct SocketGuard {
    path: PathBuf,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Err(e) = pidfile::remove_file_if_exists(&self.path) {
            warn!(error = %e, path = %self.path.display(), "failed to remove socket file");
        }
    }
}

struct Running {
    shutdown: oneshot::Sender<()>,
    accept_task: JoinHandle<()>,
}

struct Inner {
    state: DaemonState,
    running: Option<Running>,
}

/// The signing daemon. Construct once per process and share by reference.
pub struct SignerDaemon {
    handler: Arc<RequestHandler>,
    options: DaemonOptions,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for SignerDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerDaemon")
            .field("address", &self.handler.address())
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

impl SignerDaemon {
    /// Take ownership of a decrypted payload. Nothing is bound yet.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Key`] for an unusable key and
    /// [`DaemonError::Policy`] for an invalid policy.
    pub fn new(payload: DecryptedPayload, options: DaemonOptions) -> Result<Self, DaemonError> {
        let handler =
            RequestHandler::new(payload, Arc::clone(&options.approver), options.approval_timeout)?;

        Ok(Self {
            handler: Arc::new(handler),
            options,
            inner: Mutex::new(Inner {
                state: DaemonState::Stopped,
                running: None,
            }),
        })
    }

    /// The address of the loaded key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.handler.address()
    }

    /// The file locations this daemon uses.
    #[must_use]
    pub const fn paths(&self) -> &SignerPaths {
        &self.options.paths
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the socket, write the PID file and start accepting connections.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::AlreadyRunning`] if the PID file names a live
    /// process, and bind, permission or PID file errors. On error nothing is
    /// left behind.
    pub fn start(&self) -> Result<StartInfo, DaemonError> {
        let mut inner = self.lock();
        if inner.state != DaemonState::Stopped {
            return Err(DaemonError::InvalidState(inner.state));
        }
        inner.state = DaemonState::Starting;

        match self.bind_and_spawn() {
            Ok((info, running)) => {
                inner.running = Some(running);
                inner.state = DaemonState::Running;
                info!(
                    address = %info.address,
                    socket = %info.socket_path.display(),
                    pid = info.pid,
                    "daemon started"
                );
                Ok(info)
            }
            Err(e) => {
                inner.state = DaemonState::Stopped;
                Err(e)
            }
        }
    }

    fn bind_and_spawn(&self) -> Result<(StartInfo, Running), DaemonError> {
        let paths = &self.options.paths;
        let pid_error = |source| DaemonError::PidFile {
            path: paths.pid_file.clone(),
            source,
        };

        if let PidStatus::Running(pid) = pidfile::check_pid_file(&paths.pid_file).map_err(pid_error)? {
            return Err(DaemonError::AlreadyRunning { pid });
        }

        let bind_error = |source| DaemonError::Bind {
            path: paths.socket.clone(),
            source,
        };
        if let Some(dir) = paths.socket.parent() {
            std::fs::create_dir_all(dir).map_err(bind_error)?;
        }
        // Nothing live owns it, so any socket file left here is stale.
        pidfile::remove_file_if_exists(&paths.socket).map_err(bind_error)?;

        let listener = UnixListener::bind(&paths.socket).map_err(bind_error)?;
        let guard = SocketGuard {
            path: paths.socket.clone(),
        };

        restrict_socket(&paths.socket).map_err(|source| DaemonError::Permissions {
            path: paths.socket.clone(),
            source,
        })?;

        let pid = std::process::id();
        pidfile::write_pid(&paths.pid_file, pid).map_err(pid_error)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.handler),
            self.options.max_connections,
            self.options.max_request_bytes,
            shutdown_rx,
            guard,
        ));

        let info = StartInfo {
            address: self.address(),
            socket_path: paths.socket.clone(),
            pid,
        };
        Ok((
            info,
            Running {
                shutdown: shutdown_tx,
                accept_task,
            },
        ))
    }

    /// Stop accepting connections and remove the socket and PID files.
    ///
    /// Safe to call any number of times. Requests already being handled run
    /// to completion on their own tasks.
    pub async fn stop(&self) {
        // Only a daemon that started owns the files; a stopped one leaves
        // another instance's socket and PID file alone.
        let running = {
            let mut inner = self.lock();
            if inner.state != DaemonState::Running {
                return;
            }
            inner.state = DaemonState::Stopping;
            inner.running.take()
        };

        if let Some(running) = running {
            // The accept loop may already be gone; both outcomes are fine.
            let _ = running.shutdown.send(());
            if let Err(e) = running.accept_task.await {
                warn!(error = %e, "accept loop ended abnormally");
            }
        }

        let paths = &self.options.paths;
        for path in [&paths.socket, &paths.pid_file] {
            if let Err(e) = pidfile::remove_file_if_exists(path) {
                warn!(error = %e, path = %path.display(), "failed to remove file on stop");
            }
        }

        self.lock().state = DaemonState::Stopped;
        info!("daemon stopped");
    }

    /// Daemon status from the PID file. Removes a stale PID file.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::PidFile`] if the PID file cannot be read or
    /// removed.
    pub fn status(&self) -> Result<PidStatus, DaemonError> {
        daemon_status(&self.options.paths)
    }

    /// Wait for SIGINT or SIGTERM, then [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Signal`] if the handlers cannot be installed.
    pub async fn wait_for_shutdown_signal(&self) -> Result<(), DaemonError> {
        wait_for_signal().await?;
        self.stop().await;
        Ok(())
    }
}

/// Status of whichever daemon uses `paths`, for processes that do not own
/// it. Removes a stale PID file.
///
/// # Errors
///
/// Returns [`DaemonError::PidFile`] if the PID file cannot be read or
/// removed.
pub fn daemon_status(paths: &SignerPaths) -> Result<PidStatus, DaemonError> {
    pidfile::check_pid_file(&paths.pid_file).map_err(|source| DaemonError::PidFile {
        path: paths.pid_file.clone(),
        source,
    })
}

#[cfg(unix)]
fn restrict_socket(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))
}

#[cfg(not(unix))]
fn restrict_socket(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn wait_for_signal() -> Result<(), DaemonError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(DaemonError::Signal)?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(DaemonError::Signal)?;
        info!("received Ctrl+C");
    }

    Ok(())
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<RequestHandler>,
    max_connections: usize,
    max_request_bytes: usize,
    mut shutdown: oneshot::Receiver<()>,
    _guard: SocketGuard,
) {
    let connections = Arc::new(Semaphore::new(max_connections));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let Ok(permit) = Arc::clone(&connections).try_acquire_owned() else {
                        warn!(max_connections, "connection limit reached, rejecting");
                        drop(stream);
                        continue;
                    };
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler, max_request_bytes).await {
                            debug!(error = %e, "connection closed with error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            _ = &mut shutdown => {
                debug!("accept loop shutting down");
                break;
            }
        }
    }
}

/// Read request lines and answer each on its own task.
///
/// Returns once the peer has closed its side and every response has been
/// written, or the peer went away.
async fn handle_connection(
    stream: UnixStream,
    handler: Arc<RequestHandler>,
    max_request_bytes: usize,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (responses, mut outbox) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(line) = outbox.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                // Peer is gone; in-flight requests still finish.
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let limit = u64::try_from(max_request_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(1);

    let result = loop {
        line.clear();
        let read = match (&mut reader).take(limit).read_until(b'\n', &mut line).await {
            Ok(read) => read,
            Err(e) => break Err(e),
        };
        if read == 0 {
            break Ok(());
        }

        let mut end = line.len();
        while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
            end -= 1;
        }
        if end > max_request_bytes {
            warn!(limit = max_request_bytes, "request line too large, closing connection");
            let error = JsonRpcError::invalid_request(&format!(
                "request exceeds {max_request_bytes} bytes"
            ));
            let _ = responses.send(JsonRpcResponse::error(JsonRpcId::Null, error).to_line());
            break Ok(());
        }

        let request = match std::str::from_utf8(&line[..end]) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "request line is not valid UTF-8");
                let error = JsonRpcError::parse_error(&format!("request is not valid UTF-8: {e}"));
                let _ = responses.send(JsonRpcResponse::error(JsonRpcId::Null, error).to_line());
                continue;
            }
        };
        if request.trim().is_empty() {
            continue;
        }

        let request = request.to_owned();
        let handler = Arc::clone(&handler);
        let responses = responses.clone();
        tokio::spawn(async move {
            let response = handler.handle_line(&request).await;
            if responses.send(response.to_line()).is_err() {
                debug!(id = %response.id, "peer gone before response was ready");
            }
        });
    };

    drop(responses);
    if let Err(e) = writer_task.await {
        warn!(error = %e, "response writer ended abnormally");
    }
    result
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::server::approval::StaticApprover;
    use agentek_core::types::PolicyConfig;
    use agentek_crypto::SecretKey;
    use tempfile::TempDir;

    fn daemon(base: &Path) -> SignerDaemon {
        let payload = DecryptedPayload {
            private_key: SecretKey::generate(),
            policy: PolicyConfig::default(),
        };
        let options = DaemonOptions::new(
            SignerPaths::new(base),
            Arc::new(StaticApprover::approve_all()),
        );
        SignerDaemon::new(payload, options).unwrap()
    }

    #[tokio::test]
    async fn test_start_writes_files_and_stop_removes_them() {
        let temp = TempDir::new().unwrap();
        let daemon = daemon(temp.path());
        assert_eq!(daemon.state(), DaemonState::Stopped);

        let info = daemon.start().unwrap();
        assert_eq!(daemon.state(), DaemonState::Running);
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.address, daemon.address());
        assert!(info.socket_path.exists());
        assert_eq!(
            pidfile::read_pid(&daemon.paths().pid_file).unwrap(),
            Some(std::process::id())
        );
        assert!(daemon.status().unwrap().is_running());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&info.socket_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        daemon.stop().await;
        assert_eq!(daemon.state(), DaemonState::Stopped);
        assert!(!info.socket_path.exists());
        assert!(!daemon.paths().pid_file.exists());
        assert_eq!(daemon.status().unwrap(), PidStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let daemon = daemon(temp.path());
        daemon.stop().await;
        daemon.start().unwrap();
        daemon.stop().await;
        daemon.stop().await;
        assert_eq!(daemon.state(), DaemonState::Stopped);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let temp = TempDir::new().unwrap();
        let daemon = daemon(temp.path());
        daemon.start().unwrap();
        assert!(matches!(
            daemon.start(),
            Err(DaemonError::InvalidState(DaemonState::Running))
        ));
        daemon.stop().await;
    }

    #[tokio::test]
    async fn test_live_pid_file_blocks_start() {
        let temp = TempDir::new().unwrap();
        let first = daemon(temp.path());
        first.start().unwrap();

        let second = daemon(temp.path());
        match second.start() {
            Err(DaemonError::AlreadyRunning { pid }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        assert_eq!(second.state(), DaemonState::Stopped);
        // The first daemon's files are untouched.
        assert!(first.paths().socket.exists());
        first.stop().await;
    }

    #[tokio::test]
    async fn test_stale_files_are_replaced() {
        let temp = TempDir::new().unwrap();
        let paths = SignerPaths::new(temp.path());
        std::fs::write(&paths.pid_file, "999999999\n").unwrap();
        std::fs::write(&paths.socket, "").unwrap();

        let daemon = daemon(temp.path());
        let info = daemon.start().unwrap();
        assert_eq!(pidfile::read_pid(&paths.pid_file).unwrap(), Some(info.pid));
        daemon.stop().await;
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let temp = TempDir::new().unwrap();
        let payload = DecryptedPayload {
            private_key: SecretKey::generate(),
            policy: PolicyConfig::default().with_approval_threshold_pct(150),
        };
        let options = DaemonOptions::new(
            SignerPaths::new(temp.path()),
            Arc::new(StaticApprover::approve_all()),
        );
        assert!(matches!(
            SignerDaemon::new(payload, options),
            Err(DaemonError::Policy(_))
        ));
    }
}

//! # Server Module
//!
//! The signing daemon and everything it needs to serve requests.
//!
//! ## Submodules
//!
//! - [`protocol`] - JSON-RPC 2.0 types for newline-delimited framing
//! - [`handler`] - request dispatch, policy checks and signing
//! - [`approval`] - operator approval prompts
//! - [`pidfile`] - PID file and process liveness
//! - [`daemon`] - socket lifecycle and the accept loop

pub mod approval;
pub mod daemon;
pub mod handler;
pub mod pidfile;
pub mod protocol;

pub use approval::{
    ApprovalOutcome, ApprovalRequest, Approver, StaticApprover, TerminalApprover,
};
pub use daemon::{
    daemon_status, DaemonError, DaemonOptions, DaemonState, SignerDaemon, StartInfo, SOCKET_MODE,
};
pub use handler::RequestHandler;
pub use pidfile::PidStatus;
pub use protocol::{
    error_codes, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, Method,
    ParseMethodError,
};

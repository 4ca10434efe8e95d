//! # Agentek Signer
//!
//! A local daemon that holds one Ethereum key and signs on behalf of agents
//! running as the same user.
//!
//! Requests arrive as newline-delimited JSON-RPC 2.0 over a Unix socket.
//! Every signing request is checked against the policy stored in the
//! encrypted keyfile; requests the policy flags wait for the operator to
//! approve them at the daemon's terminal.
//!
//! ## Modules
//!
//! - [`server`] - the daemon: protocol, dispatch, approval and lifecycle
//! - [`client`] - [`SignerClient`] and [`RemoteAccount`] for callers
//! - [`cli`] - command-line interface
//! - [`logging`] - tracing setup
//!
//! ## Usage
//!
//! ```no_run
//! use agentek_signer::client::{RemoteAccount, SignerClient};
//! use agentek_crypto::{Account, SignableMessage};
//!
//! # async fn run() -> Result<(), agentek_signer::client::ClientError> {
//! let client = SignerClient::new("/home/me/.agentek/signer.sock");
//! let account = RemoteAccount::connect(client).await?;
//! let signature = account.sign_message(&SignableMessage::Text("hello".into())).await?;
//! println!("{} signed {signature}", account.address());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cli;
pub mod client;
pub mod logging;
pub mod server;

pub use client::{ClientError, RemoteAccount, SignerClient};
pub use logging::{
    init_logging, new_correlation_id, redact_sensitive, verbosity_to_level, LogConfig, LogError,
    LogFormat, LogGuard, LogLevel,
};
pub use server::{Approver, DaemonError, DaemonOptions, SignerDaemon, StaticApprover};

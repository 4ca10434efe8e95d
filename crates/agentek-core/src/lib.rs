//! # agentek-core
//!
//! Core types, configuration and error definitions for the agentek signing
//! daemon.
//!
//! ## Modules
//!
//! - [`error`] - Error types, result aliases and JSON-RPC error codes
//! - [`types`] - Policy and request types ([`PolicyConfig`], [`TxRequest`], [`PolicyDecision`])
//! - [`config`] - TOML daemon configuration
//! - [`config_loader`] - Loading configuration and the base-directory file layout
//!
//! ## Example
//!
//! ```rust
//! use agentek_core::{PolicyConfig, RequireApproval, TxRequest, U256};
//!
//! let policy = PolicyConfig::default().with_require_approval(RequireApproval::Never);
//! assert!(policy.validate().is_ok());
//!
//! let tx = TxRequest {
//!     chain_id: Some(1),
//!     value: Some(U256::from(1u64)),
//!     ..Default::default()
//! };
//! assert_eq!(tx.value_or_zero(), U256::from(1u64));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod types;

pub use error::{
    AgentekError, ConfigError, PolicyError, Result, RpcErrorCode, SignError, StoreError,
};

pub use config::{ClientConfig, Config, DaemonConfig, LoggingConfig};

pub use config_loader::{default_base_dir, expand_path, ConfigLoader, SignerPaths};

pub use types::{PolicyConfig, PolicyDecision, RequireApproval, TxRequest};

// Re-export U256 from alloy_primitives for working with amounts
pub use alloy_primitives::U256;

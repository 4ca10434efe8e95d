//! # CLI Module
//!
//! Command-line interface for the signing daemon.
//!
//! - [`args`] - argument definitions
//! - [`commands`] - command handlers
//! - [`passphrase`] - passphrase and private key input
//!
//! Secrets come from `AGENTEK_PASSPHRASE` / `AGENTEK_PRIVATE_KEY` when set
//! (the variable is removed from the environment once read), otherwise from
//! a hidden terminal prompt.

pub mod args;
pub mod commands;
pub mod passphrase;

pub use args::{Cli, Commands, PolicyAction};
pub use commands::CommandError;

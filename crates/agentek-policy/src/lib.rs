//! # agentek-policy
//!
//! Declarative policy evaluation for the agentek signing daemon.
//!
//! A [`PolicyConfig`](agentek_core::types::PolicyConfig) decides which
//! signing requests are refused outright, which are signed automatically,
//! and which wait for an operator to approve them.
//!
//! ## Modules
//!
//! - [`engine`] - ordered rule checks and the approval gate

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod engine;

pub use engine::{
    approval_threshold, check_rules, evaluate, evaluate_message, DefaultPolicyEngine,
    PolicyCheckResult, PolicyEngine,
};

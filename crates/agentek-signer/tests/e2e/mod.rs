//! End-to-end tests against a running daemon.

pub mod client_test;
pub mod daemon_test;

//! # Test Utilities for the Signer Daemon
//!
//! - [`temp_base_dir`] - isolated base directory for keyfile, socket and PID file
//! - [`TestDaemon`] - a started daemon with a scripted approver
//! - [`exchange_lines`] - pipeline raw request lines over one connection
//! - [`transfer`] - `sign_transaction` params for a plain ETH transfer

#![allow(dead_code)]
// Panicking on setup failures is acceptable in tests
#![allow(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agentek_core::config_loader::SignerPaths;
use agentek_core::types::PolicyConfig;
use agentek_crypto::{DecryptedPayload, SecretKey};
use agentek_signer::client::SignerClient;
use agentek_signer::server::{Approver, DaemonOptions, SignerDaemon, StaticApprover};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Private key used by every test daemon.
pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Checksummed address of [`TEST_KEY`].
pub const TEST_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

/// Create an isolated temporary base directory.
pub fn temp_base_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("agentek-test-")
        .tempdir()
        .expect("Failed to create temporary directory")
}

/// The decrypted payload for [`TEST_KEY`] with `policy`.
pub fn test_payload(policy: PolicyConfig) -> DecryptedPayload {
    DecryptedPayload {
        private_key: SecretKey::from_hex(TEST_KEY).expect("valid test key"),
        policy,
    }
}

/// A running daemon in its own base directory.
pub struct TestDaemon {
    /// The daemon under test.
    pub daemon: SignerDaemon,
    /// The approver it consults.
    pub approver: Arc<StaticApprover>,
    _dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon with default limits.
    pub fn start(policy: PolicyConfig, approver: StaticApprover) -> Self {
        Self::start_with(policy, approver, |options| options)
    }

    /// Start a daemon after adjusting its options.
    pub fn start_with(
        policy: PolicyConfig,
        approver: StaticApprover,
        configure: impl FnOnce(DaemonOptions) -> DaemonOptions,
    ) -> Self {
        let dir = temp_base_dir();
        let approver = Arc::new(approver);
        let options = configure(DaemonOptions::new(
            SignerPaths::new(dir.path()),
            Arc::clone(&approver) as Arc<dyn Approver>,
        ));
        let daemon = SignerDaemon::new(test_payload(policy), options).expect("daemon builds");
        daemon.start().expect("daemon starts");
        Self {
            daemon,
            approver,
            _dir: dir,
        }
    }

    /// The daemon's file locations.
    pub fn paths(&self) -> &SignerPaths {
        self.daemon.paths()
    }

    /// The daemon's socket.
    pub fn socket(&self) -> &Path {
        &self.daemon.paths().socket
    }

    /// A client for this daemon.
    pub fn client(&self) -> SignerClient {
        SignerClient::new(self.socket())
    }
}

/// Write `lines` on one connection, close the write side and collect every
/// response line in arrival order.
pub async fn exchange_lines(socket: &Path, lines: &[String]) -> Vec<Value> {
    let mut bytes = Vec::new();
    for line in lines {
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    exchange_bytes(socket, &bytes).await
}

/// Like [`exchange_lines`], but sends `bytes` exactly as given.
pub async fn exchange_bytes(socket: &Path, bytes: &[u8]) -> Vec<Value> {
    let stream = UnixStream::connect(socket).await.expect("connect");
    let (reader, mut writer) = stream.into_split();
    writer.write_all(bytes).await.expect("write");
    writer.shutdown().await.expect("shutdown");

    let mut reader = BufReader::new(reader);
    let mut responses = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::time::timeout(Duration::from_secs(10), reader.read_line(&mut line))
            .await
            .expect("daemon answered in time")
            .expect("read");
        if read == 0 {
            break;
        }
        responses.push(serde_json::from_str(line.trim_end()).expect("response is JSON"));
    }
    responses
}

/// A JSON-RPC request line.
pub fn request_line(method: &str, params: Value, id: i64) -> String {
    json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id}).to_string()
}

/// `sign_transaction` params for an EIP-1559 transfer.
pub fn transfer(chain_id: u64, value_wei: &str) -> Value {
    json!({
        "transaction": {
            "chainId": chain_id,
            "to": "0x000000000000000000000000000000000000dead",
            "value": value_wei,
            "nonce": 0,
            "gas": 21000,
            "maxFeePerGas": "30000000000",
            "maxPriorityFeePerGas": "1000000000"
        }
    })
}

/// A small EIP-712 document.
pub fn mail_typed_data() -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "chainId", "type": "uint256"}
            ],
            "Mail": [{"name": "contents", "type": "string"}]
        },
        "primaryType": "Mail",
        "domain": {"name": "Agentek", "chainId": 1},
        "message": {"contents": "hi"}
    })
}

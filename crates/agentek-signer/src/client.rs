//! # Client
//!
//! Talks to a running daemon over its Unix socket.
//!
//! Every call opens a fresh connection, writes one request line, reads one
//! response line and closes the connection. Concurrent calls use concurrent
//! connections. A call that takes longer than the timeout (120 s by
//! default) is abandoned and its socket dropped.
//!
//! [`RemoteAccount`] implements the same [`Account`] trait as
//! [`LocalAccount`](agentek_crypto::LocalAccount), so code that signs does
//! not care where the key lives.
//!
//! ```no_run
//! use agentek_crypto::{Account, SignableMessage};
//! use agentek_signer::client::{RemoteAccount, SignerClient};
//!
//! # async fn run() -> Result<(), agentek_signer::client::ClientError> {
//! let client = SignerClient::new("/home/me/.agentek/signer.sock");
//! let account = RemoteAccount::connect(client).await?;
//! let signature = account.sign_message(&SignableMessage::from("hello")).await?;
//! println!("{} signed: {signature}", account.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use agentek_core::config::ClientConfig;
use agentek_crypto::{Account, SignableMessage, TransactionRequest, TypedData};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::server::protocol::{JsonRpcId, JsonRpcRequest, JsonRpcResponse, Method};

/// Default time to wait for a response. Longer than the daemon's approval
/// timeout so an unanswered prompt surfaces as a denial, not a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from talking to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No daemon is listening on the socket.
    #[error("cannot connect to signer daemon at {path}: {source}")]
    Connect {
        /// The socket path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The connection failed mid-request.
    #[error("signer connection error: {0}")]
    Io(#[from] std::io::Error),

    /// No response within the timeout.
    #[error("signer request '{method}' timed out after {}s", timeout.as_secs())]
    Timeout {
        /// The method that timed out.
        method: String,
        /// How long the client waited.
        timeout: Duration,
    },

    /// The daemon sent something that is not a valid response.
    #[error("invalid response from signer daemon: {0}")]
    Protocol(String),

    /// The daemon answered with a JSON-RPC error.
    #[error("signer error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Error message from the daemon.
        message: String,
    },
}

impl ClientError {
    /// The JSON-RPC error code, for [`ClientError::Rpc`].
    #[must_use]
    pub const fn rpc_code(&self) -> Option<i32> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// One-shot JSON-RPC client for the daemon socket.
#[derive(Debug)]
pub struct SignerClient {
    socket_path: PathBuf,
    timeout: Duration,
    next_id: AtomicI64,
}

impl SignerClient {
    /// A client for the daemon listening on `socket_path`.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_TIMEOUT,
            next_id: AtomicI64::new(1),
        }
    }

    /// A client with the timeout from the `[client]` config section.
    #[must_use]
    pub fn from_config(socket_path: impl Into<PathBuf>, config: &ClientConfig) -> Self {
        Self::new(socket_path).with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Override the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The socket this client connects to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Call `method` and return its `result`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] when the daemon answers with an error,
    /// [`ClientError::Timeout`] when it does not answer in time, and
    /// connection or protocol errors otherwise.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = JsonRpcRequest::new(method, params, id);

        let response = tokio::time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| ClientError::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            })??;

        if response.id != request.id {
            return Err(ClientError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }
        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| ClientError::Protocol("response has neither result nor error".into()))
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        method: Method,
        params: Value,
    ) -> Result<T, ClientError> {
        let result = self.call(method.as_str(), params).await?;
        serde_json::from_value(result)
            .map_err(|e| ClientError::Protocol(format!("unexpected {method} result: {e}")))
    }

    async fn exchange(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_string(request)
            .map_err(|e| ClientError::Protocol(format!("cannot encode request: {e}")))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        debug!(method = %request.method, id = %request.id, "request sent");

        let mut reader = BufReader::new(reader);
        let mut response = String::new();
        if reader.read_line(&mut response).await? == 0 {
            return Err(ClientError::Protocol(
                "daemon closed the connection without responding".into(),
            ));
        }

        serde_json::from_str(response.trim_end())
            .map_err(|e| ClientError::Protocol(format!("malformed response: {e}")))
    }

    /// Liveness check.
    ///
    /// # Errors
    ///
    /// Returns any call error, or [`ClientError::Protocol`] if the answer is
    /// not `"pong"`.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let answer: String = self.call_as(Method::Ping, Value::Null).await?;
        if answer == "pong" {
            Ok(())
        } else {
            Err(ClientError::Protocol(format!("unexpected ping answer '{answer}'")))
        }
    }

    /// True if the daemon answers `ping`. Never fails.
    pub async fn is_reachable(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// The daemon's signing address.
    ///
    /// # Errors
    ///
    /// Returns any call error.
    pub async fn address(&self) -> Result<Address, ClientError> {
        self.call_as(Method::GetAddress, Value::Null).await
    }
}

/// True if a daemon on `socket_path` answers `ping`. Never fails.
pub async fn is_daemon_reachable(socket_path: &Path) -> bool {
    SignerClient::new(socket_path).is_reachable().await
}

/// The address of the daemon on `socket_path`.
///
/// # Errors
///
/// Returns any call error, including [`ClientError::Rpc`].
pub async fn get_daemon_address(socket_path: &Path) -> Result<Address, ClientError> {
    SignerClient::new(socket_path).address().await
}

/// An [`Account`] whose key lives in the daemon.
#[derive(Debug)]
pub struct RemoteAccount {
    client: SignerClient,
    address: Address,
}

impl RemoteAccount {
    /// Ask the daemon for its address once and wrap the client.
    ///
    /// # Errors
    ///
    /// Returns any error from `get_address`.
    pub async fn connect(client: SignerClient) -> Result<Self, ClientError> {
        let address = client.address().await?;
        Ok(Self { client, address })
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &SignerClient {
        &self.client
    }
}

#[async_trait]
impl Account for RemoteAccount {
    type Error = ClientError;

    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &SignableMessage) -> Result<Bytes, ClientError> {
        self.client
            .call_as(Method::SignMessage, json!({ "message": message }))
            .await
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Bytes, ClientError> {
        self.client
            .call_as(Method::SignTypedData, json!({ "typedData": typed_data }))
            .await
    }

    async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, ClientError> {
        // Quantities serialize as decimal strings, so no precision is lost.
        self.client
            .call_as(Method::SignTransaction, json!({ "transaction": tx }))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    /// A socket that answers every request line with `reply(request)`.
    fn fake_daemon(
        path: &Path,
        reply: fn(&JsonRpcRequest) -> Option<String>,
    ) -> tokio::task::JoinHandle<()> {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut reader = BufReader::new(reader);
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
                    match reply(&request) {
                        Some(answer) => writer.write_all(answer.as_bytes()).await.unwrap(),
                        // hold the connection open without answering
                        None => tokio::time::sleep(Duration::from_secs(30)).await,
                    }
                });
            }
        })
    }

    fn pong(request: &JsonRpcRequest) -> Option<String> {
        Some(JsonRpcResponse::success(request.id.clone(), "pong").to_line())
    }

    #[tokio::test]
    async fn test_missing_socket_is_connect_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signer.sock");

        let client = SignerClient::new(&path);
        assert!(matches!(
            client.call("ping", Value::Null).await,
            Err(ClientError::Connect { .. })
        ));
        assert!(!is_daemon_reachable(&path).await);
    }

    #[tokio::test]
    async fn test_ping_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signer.sock");
        let _server = fake_daemon(&path, pong);

        let client = SignerClient::new(&path);
        client.ping().await.unwrap();
        assert!(client.is_reachable().await);
    }

    #[tokio::test]
    async fn test_timeout_names_the_method() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signer.sock");
        let _server = fake_daemon(&path, |_| None);

        let client = SignerClient::new(&path).with_timeout(Duration::from_millis(100));
        let err = client.call("sign_message", json!({})).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { ref method, .. } if method == "sign_message"));
        assert!(err.to_string().contains("sign_message"));
    }

    #[tokio::test]
    async fn test_rpc_error_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signer.sock");
        let _server = fake_daemon(&path, |request| {
            let error = crate::server::protocol::JsonRpcError::policy_denied("chain 5 is not allowed");
            Some(JsonRpcResponse::error(request.id.clone(), error).to_line())
        });

        let err = get_daemon_address(&path).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(-32000));
        assert!(err.to_string().contains("chain 5"));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_protocol_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("signer.sock");
        let _server = fake_daemon(&path, |_| {
            Some(JsonRpcResponse::success(JsonRpcId::String("other".into()), "pong").to_line())
        });

        let err = SignerClient::new(&path).ping().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_timeout_message() {
        let err = ClientError::Timeout {
            method: "sign_transaction".into(),
            timeout: DEFAULT_TIMEOUT,
        };
        assert_eq!(
            err.to_string(),
            "signer request 'sign_transaction' timed out after 120s"
        );
    }
}

//! # JSON-RPC 2.0 Protocol Types
//!
//! Request/response types for newline-delimited JSON-RPC 2.0 over the
//! daemon's Unix socket. Every frame is one JSON object on one line.
//!
//! ```rust
//! use agentek_signer::server::protocol::{parse_request, JsonRpcId, Method};
//!
//! let request = parse_request(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
//! assert_eq!(request.id, JsonRpcId::Number(1));
//! assert_eq!(request.method.parse::<Method>(), Ok(Method::Ping));
//!
//! let missing_id = parse_request(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap_err();
//! assert_eq!(missing_id.error.unwrap().code, -32600);
//! ```

use agentek_core::error::{AgentekError, RpcErrorCode};
use agentek_crypto::{SignableMessage, TransactionRequest, TypedData};
use serde::{Deserialize, Serialize};

/// Wire error codes.
pub mod error_codes {
    use agentek_core::error::RpcErrorCode;

    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = RpcErrorCode::ParseFailed.code();

    /// The JSON is not a valid request object.
    pub const INVALID_REQUEST: i32 = RpcErrorCode::InvalidRequest.code();

    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i32 = RpcErrorCode::MethodNotFound.code();

    /// The params are missing or malformed.
    pub const INVALID_PARAMS: i32 = RpcErrorCode::InvalidParams.code();

    /// Unexpected failure while handling the request.
    pub const INTERNAL_ERROR: i32 = RpcErrorCode::InternalError.code();

    /// The policy refused the request.
    pub const POLICY_DENIED: i32 = RpcErrorCode::PolicyDenied.code();

    /// The operator refused the request or did not answer in time.
    pub const APPROVAL_DENIED: i32 = RpcErrorCode::ApprovalDenied.code();
}

/// JSON-RPC request id: a string, a number or null.
///
/// Responses echo the id of the request they answer; with out-of-order
/// responses it is the only way to pair them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
    /// Null identifier
    #[default]
    Null,
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// JSON-RPC 2.0 request object. `jsonrpc`, `method` and `id` are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, must be "2.0"
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: serde_json::Value,

    /// Request identifier
    pub id: JsonRpcId,
}

impl JsonRpcRequest {
    /// Build a request.
    #[must_use]
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: JsonRpcId) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Checks the version and method fields.
    ///
    /// # Errors
    ///
    /// Returns an `INVALID_REQUEST` error if `jsonrpc` is not "2.0" or
    /// `method` is empty.
    pub fn validate(&self) -> Result<(), JsonRpcError> {
        if self.jsonrpc != "2.0" {
            return Err(JsonRpcError::invalid_request(
                "jsonrpc version must be \"2.0\"",
            ));
        }

        if self.method.is_empty() {
            return Err(JsonRpcError::invalid_request("method cannot be empty"));
        }

        Ok(())
    }
}

/// Parse one line into a validated request.
///
/// # Errors
///
/// Returns the error response to send back: `PARSE_ERROR` for malformed
/// JSON, `INVALID_REQUEST` for a missing or wrong `jsonrpc`, `method` or
/// `id`. The response carries the request id whenever one could be read.
pub fn parse_request(line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        JsonRpcResponse::error(JsonRpcId::Null, JsonRpcError::parse_error(&e.to_string()))
    })?;

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<JsonRpcId>(id.clone()).ok())
        .unwrap_or_default();

    if !value.is_object() {
        return Err(JsonRpcResponse::error(
            id,
            JsonRpcError::invalid_request("request must be a JSON object"),
        ));
    }

    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::error(id.clone(), JsonRpcError::invalid_request(&e.to_string()))
    })?;

    request
        .validate()
        .map_err(|e| JsonRpcResponse::error(request.id.clone(), e))?;

    Ok(request)
}

/// JSON-RPC 2.0 response object: exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version (always "2.0")
    pub jsonrpc: String,

    /// Result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Id of the request this answers
    pub id: JsonRpcId,
}

impl JsonRpcResponse {
    /// A successful response.
    pub fn success(id: JsonRpcId, result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                jsonrpc: "2.0".to_string(),
                result: Some(value),
                error: None,
                id,
            },
            Err(e) => Self::error(id, JsonRpcError::internal_error(&e.to_string())),
        }
    }

    /// An error response.
    #[must_use]
    pub fn error(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Serialize to one line, newline included.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error: failed to serialize response"},"id":null}"#
                .to_string()
        });
        line.push('\n');
        line
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,

    /// Human-readable message
    pub message: String,

    /// Optional extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    fn with_code(code: RpcErrorCode, detail: &str) -> Self {
        Self {
            code: code.code(),
            message: format!("{}: {detail}", code.message()),
            data: None,
        }
    }

    /// Malformed JSON.
    #[must_use]
    pub fn parse_error(message: &str) -> Self {
        Self::with_code(RpcErrorCode::ParseFailed, message)
    }

    /// Not a valid request object.
    #[must_use]
    pub fn invalid_request(message: &str) -> Self {
        Self::with_code(RpcErrorCode::InvalidRequest, message)
    }

    /// Unknown method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::with_code(RpcErrorCode::MethodNotFound, method)
    }

    /// Bad params.
    #[must_use]
    pub fn invalid_params(message: &str) -> Self {
        Self::with_code(RpcErrorCode::InvalidParams, message)
    }

    /// Unexpected failure.
    #[must_use]
    pub fn internal_error(message: &str) -> Self {
        Self::with_code(RpcErrorCode::InternalError, message)
    }

    /// Policy refusal; the message carries the policy's reason.
    #[must_use]
    pub fn policy_denied(reason: &str) -> Self {
        Self::with_code(RpcErrorCode::PolicyDenied, reason)
    }

    /// Operator refusal or timeout.
    #[must_use]
    pub fn approval_denied(reason: &str) -> Self {
        Self::with_code(RpcErrorCode::ApprovalDenied, reason)
    }
}

impl From<&AgentekError> for JsonRpcError {
    fn from(error: &AgentekError) -> Self {
        match error {
            AgentekError::PolicyDenied { reason } => Self::policy_denied(reason),
            AgentekError::ApprovalDenied { reason } => Self::approval_denied(reason),
            AgentekError::Sign(inner) => Self::with_code(RpcErrorCode::from(error), &inner.to_string()),
        }
    }
}

/// Methods the daemon serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Liveness check, answers "pong"
    Ping,
    /// The signing address
    GetAddress,
    /// Policy-checked, approval-gated transaction signing
    SignTransaction,
    /// Approval-gated EIP-191 message signing
    SignMessage,
    /// Approval-gated EIP-712 signing
    SignTypedData,
}

/// Error returned when parsing an unknown method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown method: {method}")]
pub struct ParseMethodError {
    /// The unknown method name.
    pub method: String,
}

impl std::str::FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(Self::Ping),
            "get_address" => Ok(Self::GetAddress),
            "sign_transaction" => Ok(Self::SignTransaction),
            "sign_message" => Ok(Self::SignMessage),
            "sign_typed_data" => Ok(Self::SignTypedData),
            _ => Err(ParseMethodError {
                method: s.to_string(),
            }),
        }
    }
}

impl Method {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetAddress => "get_address",
            Self::SignTransaction => "sign_transaction",
            Self::SignMessage => "sign_message",
            Self::SignTypedData => "sign_typed_data",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Params of `sign_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignTransactionParams {
    /// The transaction to sign
    pub transaction: TransactionRequest,
}

/// Params of `sign_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignMessageParams {
    /// Text, or `{"raw": "0x.."}`
    pub message: SignableMessage,
}

/// Params of `sign_typed_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignTypedDataParams {
    /// Full EIP-712 payload
    #[serde(rename = "typedData")]
    pub typed_data: TypedData,
}

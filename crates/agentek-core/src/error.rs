//! Error types for the agentek signing daemon.
//!
//! Errors are organized by domain:
//!
//! - [`SignError`] - Key material and signing failures
//! - [`StoreError`] - Keyfile encryption, decryption and persistence failures
//! - [`PolicyError`] - Policy configuration failures (not denials)
//! - [`ConfigError`] - Daemon configuration failures
//! - [`AgentekError`] - How a signing request ended in failure
//!
//! Integrity failures while opening a keyfile are deliberately collapsed into
//! a single [`StoreError::DecryptionFailed`] so callers cannot tell a wrong
//! passphrase apart from a tampered file. Policy denials go the other way and
//! always carry a specific reason.
//!
//! # Example
//!
//! ```rust
//! use agentek_core::error::{AgentekError, RpcErrorCode, SignError};
//!
//! let err: AgentekError = SignError::invalid_transaction("nonce is required").into();
//! assert_eq!(RpcErrorCode::from(&err), RpcErrorCode::InvalidParams);
//!
//! let denied = AgentekError::policy_denied("chain 5 is not allowed");
//! assert_eq!(RpcErrorCode::from(&denied).code(), -32000);
//! ```

use std::fmt;

/// Why a signing request failed.
#[derive(Debug, thiserror::Error)]
pub enum AgentekError {
    /// The policy engine denied the request.
    #[error("Policy denied: {reason}")]
    PolicyDenied {
        /// Human-readable reason for denial.
        reason: String,
    },

    /// The operator refused the request or did not answer in time.
    #[error("Approval denied: {reason}")]
    ApprovalDenied {
        /// Why the approval was not granted.
        reason: String,
    },

    /// Signing operation failed.
    #[error("Signing error: {0}")]
    Sign(#[from] SignError),
}

impl AgentekError {
    /// Create a policy denied error.
    #[must_use]
    pub fn policy_denied(reason: impl Into<String>) -> Self {
        Self::PolicyDenied {
            reason: reason.into(),
        }
    }

    /// Create an approval denied error.
    #[must_use]
    pub fn approval_denied(reason: impl Into<String>) -> Self {
        Self::ApprovalDenied {
            reason: reason.into(),
        }
    }
}

/// JSON-RPC 2.0 error codes used on the daemon socket.
///
/// Standard codes from -32700 to -32600 are defined by JSON-RPC.
/// Application-specific codes use the -32000 to -32099 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RpcErrorCode {
    /// Invalid JSON was received by the server.
    ParseFailed = -32700,
    /// The JSON sent is not a valid Request object.
    InvalidRequest = -32600,
    /// The method does not exist or is not available.
    MethodNotFound = -32601,
    /// Invalid method parameter(s).
    InvalidParams = -32602,
    /// Internal JSON-RPC error.
    InternalError = -32603,

    // Application-specific codes (-32000 to -32099)
    /// The policy engine denied the request.
    PolicyDenied = -32000,
    /// Interactive approval was refused or timed out.
    ApprovalDenied = -32001,
}

impl RpcErrorCode {
    /// Get the numeric error code value.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Get a human-readable message for this error code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseFailed => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::PolicyDenied => "Policy denied",
            Self::ApprovalDenied => "Approval denied",
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl From<&AgentekError> for RpcErrorCode {
    fn from(error: &AgentekError) -> Self {
        match error {
            AgentekError::PolicyDenied { .. } => Self::PolicyDenied,
            AgentekError::ApprovalDenied { .. } => Self::ApprovalDenied,
            AgentekError::Sign(
                SignError::InvalidTransaction { .. } | SignError::InvalidTypedData { .. },
            ) => Self::InvalidParams,
            AgentekError::Sign(SignError::InvalidKey | SignError::SignatureFailed { .. }) => {
                Self::InternalError
            }
        }
    }
}

// ============================================================================
// SignError
// ============================================================================

/// Errors that can occur while preparing or producing a signature.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The key material is not a valid secp256k1 scalar.
    #[error("invalid key material")]
    InvalidKey,

    /// The signing operation failed.
    #[error("signature failed: {context}")]
    SignatureFailed {
        /// Context about why signing failed.
        context: String,
    },

    /// The transaction request cannot be turned into a signable transaction.
    #[error("invalid transaction: {context}")]
    InvalidTransaction {
        /// What is wrong with the request.
        context: String,
    },

    /// The EIP-712 payload could not be hashed.
    #[error("invalid typed data: {context}")]
    InvalidTypedData {
        /// What is wrong with the payload.
        context: String,
    },
}

impl SignError {
    /// Create a `SignatureFailed` error with context.
    #[must_use]
    pub fn signature_failed(context: impl Into<String>) -> Self {
        Self::SignatureFailed {
            context: context.into(),
        }
    }

    /// Create an `InvalidTransaction` error with context.
    #[must_use]
    pub fn invalid_transaction(context: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            context: context.into(),
        }
    }

    /// Create an `InvalidTypedData` error with context.
    #[must_use]
    pub fn invalid_typed_data(context: impl Into<String>) -> Self {
        Self::InvalidTypedData {
            context: context.into(),
        }
    }
}

// ============================================================================
// StoreError
// ============================================================================

/// Errors that can occur while encrypting, decrypting or persisting a keyfile.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    IoError(#[source] std::io::Error),

    /// Encryption failed.
    #[error("encryption failed: {context}")]
    EncryptionFailed {
        /// What failed.
        context: String,
    },

    /// MAC or authentication tag verification failed.
    ///
    /// Never says whether the passphrase was wrong or the file was altered.
    #[error("MAC verification failed: wrong passphrase or corrupted keyfile")]
    DecryptionFailed,

    /// A keyfile already exists at the target path.
    #[error("keyfile already exists: {path}")]
    KeyfileExists {
        /// Location of the existing keyfile.
        path: String,
    },

    /// No keyfile exists at the expected path.
    #[error("keyfile not found: {path}")]
    KeyfileNotFound {
        /// Location that was checked.
        path: String,
    },

    /// The keyfile is structurally invalid or uses unsupported parameters.
    #[error("invalid keyfile format: {context}")]
    InvalidFormat {
        /// What is wrong with the file.
        context: String,
    },

    /// Insufficient file system permissions.
    #[error("permission denied")]
    PermissionDenied,
}

impl StoreError {
    /// Create an `EncryptionFailed` error.
    #[must_use]
    pub fn encryption_failed(context: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            context: context.into(),
        }
    }

    /// Create a `KeyfileExists` error.
    #[must_use]
    pub fn keyfile_exists(path: impl Into<String>) -> Self {
        Self::KeyfileExists { path: path.into() }
    }

    /// Create a `KeyfileNotFound` error.
    #[must_use]
    pub fn keyfile_not_found(path: impl Into<String>) -> Self {
        Self::KeyfileNotFound { path: path.into() }
    }

    /// Create an `InvalidFormat` error.
    #[must_use]
    pub fn invalid_format(context: impl Into<String>) -> Self {
        Self::InvalidFormat {
            context: context.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::IoError(error),
        }
    }
}

// ============================================================================
// PolicyError
// ============================================================================

/// Errors in a policy configuration.
///
/// These are configuration problems, not denials. A denial is an expected
/// outcome of evaluation and is reported through
/// [`PolicyDecision`](crate::types::PolicyDecision) instead.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy configuration is invalid.
    #[error("invalid policy: {context}")]
    InvalidConfiguration {
        /// Context about what is invalid.
        context: String,
    },
}

impl PolicyError {
    /// Create an `InvalidConfiguration` error.
    #[must_use]
    pub fn invalid_configuration(context: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            context: context.into(),
        }
    }
}

// ============================================================================
// ConfigError
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {context}")]
    ParseFailed {
        /// Context about the parsing failure.
        context: String,
    },

    /// A configuration value is invalid.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// The field name with the invalid value.
        field: String,
        /// The invalid value.
        value: String,
    },

    /// The home directory could not be determined.
    #[error("could not determine home directory")]
    NoHomeDirectory,

    /// An I/O error occurred while reading or writing configuration.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create a `ParseFailed` error.
    #[must_use]
    pub fn parse_failed(context: impl Into<String>) -> Self {
        Self::ParseFailed {
            context: context.into(),
        }
    }

    /// Create an `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a `NoHomeDirectory` error.
    #[must_use]
    pub const fn no_home_directory() -> Self {
        Self::NoHomeDirectory
    }

    /// Create an `Io` error with context.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

// ============================================================================
// Result type aliases
// ============================================================================

/// Result of serving a signing request.
pub type Result<T> = std::result::Result<T, AgentekError>;

// ============================================================================
// Unit Tests
// ============================================================================

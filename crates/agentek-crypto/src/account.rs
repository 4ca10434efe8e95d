//! Signing accounts.
//!
//! [`Account`] is the one interface callers sign through. [`LocalAccount`]
//! holds the key in-process; the daemon client provides a remote
//! implementation with the same surface.

use alloy_consensus::{SignableTransaction, TxEnvelope};
use alloy_dyn_abi::TypedData;
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{eip191_hash_message, Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use agentek_core::error::SignError;

use crate::keypair::Secp256k1KeyPair;
use crate::transaction::{TransactionRequest, UnsignedTransaction};

/// A personal message to sign under EIP-191.
///
/// Serializes as a plain JSON string for text, or `{"raw": "0x.."}` for bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignableMessage {
    /// UTF-8 text, signed as its bytes.
    Text(String),
    /// Arbitrary bytes.
    Raw {
        /// The bytes, hex on the wire.
        raw: Bytes,
    },
}

impl SignableMessage {
    /// The message bytes that go into the EIP-191 prefix hash.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Raw { raw } => raw,
        }
    }

    /// A short human-readable rendering for approval prompts.
    #[must_use]
    pub fn preview(&self) -> String {
        const MAX: usize = 120;
        match self {
            Self::Text(text) if text.chars().count() > MAX => {
                format!("{}...", text.chars().take(MAX).collect::<String>())
            }
            Self::Text(text) => text.clone(),
            Self::Raw { raw } => format!("{raw} ({} bytes)", raw.len()),
        }
    }
}

impl From<&str> for SignableMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for SignableMessage {
    fn from(raw: Vec<u8>) -> Self {
        Self::Raw { raw: raw.into() }
    }
}

/// Something that can sign on behalf of one address.
#[async_trait]
pub trait Account: Send + Sync {
    /// The error signing operations return.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The account address.
    fn address(&self) -> Address;

    /// Sign an EIP-191 personal message. Returns 65 bytes `r || s || v`.
    async fn sign_message(&self, message: &SignableMessage) -> Result<Bytes, Self::Error>;

    /// Sign EIP-712 typed data. Returns 65 bytes `r || s || v`.
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Bytes, Self::Error>;

    /// Sign a transaction. Returns the EIP-2718 encoded signed transaction.
    async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, Self::Error>;
}

/// An account whose key lives in this process.
#[derive(Debug)]
pub struct LocalAccount {
    keypair: Secp256k1KeyPair,
    address: Address,
}

impl LocalAccount {
    /// Wrap a key pair.
    #[must_use]
    pub fn new(keypair: Secp256k1KeyPair) -> Self {
        let address = keypair.public_key().ethereum_address();
        Self { keypair, address }
    }

    fn sign_hash(&self, hash: B256) -> Result<Bytes, SignError> {
        let signature = self.keypair.sign(&hash.0)?;
        Ok(Bytes::copy_from_slice(&signature.to_rsv_bytes()))
    }

    /// Sign an already-built transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::SignatureFailed`] if ECDSA signing fails.
    pub fn sign_unsigned(&self, tx: UnsignedTransaction) -> Result<Bytes, SignError> {
        let hash = tx.signature_hash();
        let signature = self.keypair.sign(&hash.0)?.to_alloy();
        let envelope: TxEnvelope = match tx {
            UnsignedTransaction::Legacy(tx) => tx.into_signed(signature).into(),
            UnsignedTransaction::Eip1559(tx) => tx.into_signed(signature).into(),
        };
        Ok(envelope.encoded_2718().into())
    }
}

#[async_trait]
impl Account for LocalAccount {
    type Error = SignError;

    fn address(&self) -> Address {
        self.address
    }

    async fn sign_message(&self, message: &SignableMessage) -> Result<Bytes, SignError> {
        self.sign_hash(eip191_hash_message(message.as_bytes()))
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Bytes, SignError> {
        let hash = typed_data
            .eip712_signing_hash()
            .map_err(|e| SignError::invalid_typed_data(e.to_string()))?;
        self.sign_hash(hash)
    }

    async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, SignError> {
        self.sign_unsigned(tx.build()?)
    }
}

//! # agentek-crypto
//!
//! Key material, the keyfile codec and Ethereum signing for the agentek
//! signing daemon.
//!
//! ## Modules
//!
//! - [`keys`] - [`SecretKey`] with zeroization and constant-time comparison
//! - [`keypair`] - secp256k1 key pair, address derivation, recoverable signatures
//! - [`keystore`] - V3 keystore plus encrypted policy, under one passphrase
//! - [`store`] - keyfile persistence with owner-only permissions
//! - [`transaction`] - transaction requests as they arrive over JSON
//! - [`account`] - the [`Account`] signing interface and [`LocalAccount`]
//!
//! ## Security
//!
//! - No unsafe code allowed
//! - Private keys are zeroized on drop and redacted from debug output
//! - The keystore MAC is compared in constant time

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod keypair;
pub mod keys;
pub mod keystore;
pub mod store;
pub mod transaction;

pub use account::{Account, LocalAccount, SignableMessage};
pub use keypair::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};
pub use keys::{SecretKey, SecretKeyError, SECRET_KEY_LEN};
pub use keystore::{
    decrypt, encrypt, rewrap_policy, AgentekKeyfile, DecryptedPayload, EncryptedPolicy,
    V3Keystore, KEYSTORE_VERSION,
};
pub use store::{keyfile_exists, read_keyfile, write_keyfile, KeyfileStore};
pub use transaction::{TransactionRequest, UnsignedTransaction};

// Re-exported so downstream crates name typed data without a direct dependency.
pub use alloy_dyn_abi::TypedData;

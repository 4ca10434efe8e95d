//! Secret key type with secure memory handling.
//!
//! [`SecretKey`] is the only place raw private key bytes live outside the
//! keystore ciphertext:
//! - zeroized on drop
//! - never shown in debug output
//! - compared in constant time
//! - not `Clone`, so it is moved rather than duplicated

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// The length of a secret key in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// A 32-byte secp256k1 private key with automatic zeroization.
///
/// # Example
///
/// ```
/// use agentek_crypto::keys::SecretKey;
///
/// let key = SecretKey::from_hex(
///     "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
/// ).expect("valid hex key");
/// assert_eq!(key.as_bytes()[0], 0x4c);
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; SECRET_KEY_LEN],
}

impl SecretKey {
    /// Create a new `SecretKey` from raw bytes.
    ///
    /// The caller should zeroize its own copy afterwards.
    #[must_use]
    pub const fn new(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a new random key from the operating system RNG.
    ///
    /// The result is not checked against the curve order; use
    /// [`Secp256k1KeyPair::generate`](crate::keypair::Secp256k1KeyPair::generate)
    /// when a usable signing key is needed.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Parse a 64-character hex key, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SecretKeyError::InvalidHex`] if the input is not exactly 32
    /// bytes of hex.
    pub fn from_hex(input: &str) -> Result<Self, SecretKeyError> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let decoded = Zeroizing::new(hex::decode(digits).map_err(|_| SecretKeyError::InvalidHex)?);
        if decoded.len() != SECRET_KEY_LEN {
            return Err(SecretKeyError::InvalidHex);
        }

        let mut bytes = [0u8; SECRET_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        let key = Self::new(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Expose the raw bytes for the immediate cryptographic operation.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.bytes
    }

    /// Returns the key as `0x`-prefixed lowercase hex in a zeroizing buffer.
    #[must_use]
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.bytes)))
    }
}

/// Errors related to secret key handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SecretKeyError {
    /// The input is not 32 bytes of hex.
    #[error("private key must be 32 bytes of hex")]
    InvalidHex,
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SecretKey {}

impl From<[u8; SECRET_KEY_LEN]> for SecretKey {
    fn from(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_generate_produces_unique_keys() {
        let key1 = SecretKey::generate();
        let key2 = SecretKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_debug_does_not_expose_key_material() {
        let key = SecretKey::new([0xABu8; SECRET_KEY_LEN]);
        let debug_output = format!("{key:?}");
        assert_eq!(debug_output, "SecretKey([REDACTED])");
        assert!(!debug_output.contains("ab"));
    }

    #[test]
    fn test_partial_eq() {
        let key1 = SecretKey::new([0x42u8; SECRET_KEY_LEN]);
        let key2 = SecretKey::new([0x42u8; SECRET_KEY_LEN]);
        let key3 = SecretKey::new([0x43u8; SECRET_KEY_LEN]);

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_from_hex_with_and_without_prefix() {
        let hex_key = "11".repeat(32);
        let a = SecretKey::from_hex(&hex_key).unwrap();
        let b = SecretKey::from_hex(&format!("0x{hex_key}")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), &[0x11u8; SECRET_KEY_LEN]);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert_eq!(
            SecretKey::from_hex("0x1234").unwrap_err(),
            SecretKeyError::InvalidHex
        );
        assert_eq!(
            SecretKey::from_hex(&"zz".repeat(32)).unwrap_err(),
            SecretKeyError::InvalidHex
        );
    }

    #[test]
    fn test_to_hex() {
        let key = SecretKey::new([0x0fu8; SECRET_KEY_LEN]);
        assert_eq!(key.to_hex().as_str(), format!("0x{}", "0f".repeat(32)));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SecretKey>();
    }
}

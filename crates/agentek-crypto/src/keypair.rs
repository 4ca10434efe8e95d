//! secp256k1 key pair, public key and recoverable signature.
//!
//! # Example
//!
//! ```rust
//! use agentek_crypto::keypair::Secp256k1KeyPair;
//!
//! let keypair = Secp256k1KeyPair::generate();
//! let address = keypair.public_key().ethereum_address();
//! println!("address: {address}");
//!
//! let hash = [7u8; 32];
//! let signature = keypair.sign(&hash).expect("signing failed");
//! assert!(keypair.verify(&hash, &signature));
//! assert!(signature.recovery_id() <= 1);
//! ```

use alloy_primitives::{Address, Signature, U256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::keys::SecretKey;
use agentek_core::error::SignError;

// ============================================================================
// Secp256k1PublicKey
// ============================================================================

/// A secp256k1 public key in both encodings.
#[derive(Clone, PartialEq, Eq)]
pub struct Secp256k1PublicKey {
    /// Compressed public key (33 bytes: prefix + X coordinate)
    compressed: [u8; 33],
    /// Uncompressed public key (65 bytes: prefix + X + Y coordinates)
    uncompressed: [u8; 65],
}

impl Secp256k1PublicKey {
    fn from_verifying_key(verifying: &VerifyingKey) -> Self {
        let mut uncompressed = [0u8; 65];
        uncompressed.copy_from_slice(verifying.to_encoded_point(false).as_bytes());

        let mut compressed = [0u8; 33];
        compressed.copy_from_slice(verifying.to_encoded_point(true).as_bytes());

        Self {
            compressed,
            uncompressed,
        }
    }

    /// Get the compressed public key (33 bytes).
    #[must_use]
    pub const fn compressed(&self) -> &[u8; 33] {
        &self.compressed
    }

    /// Get the uncompressed public key (65 bytes, `0x04 || X || Y`).
    #[must_use]
    pub const fn uncompressed(&self) -> &[u8; 65] {
        &self.uncompressed
    }

    /// Derive the Ethereum address: the last 20 bytes of the Keccak-256
    /// hash of the uncompressed key without its `0x04` prefix.
    #[must_use]
    pub fn ethereum_address(&self) -> Address {
        let hash = Keccak256::digest(&self.uncompressed[1..]);
        Address::from_slice(&hash[12..])
    }

    /// The address as lowercase hex without `0x`, as stored in a V3 keystore.
    #[must_use]
    pub fn keystore_address(&self) -> String {
        hex::encode(self.ethereum_address())
    }
}

impl std::fmt::Debug for Secp256k1PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secp256k1PublicKey({})", hex::encode(self.compressed))
    }
}

// ============================================================================
// Secp256k1Signature
// ============================================================================

/// A low-S ECDSA signature with its recovery id.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secp256k1Signature {
    /// r || s
    bytes: [u8; 64],
    /// 0 or 1
    recovery_id: u8,
}

impl Secp256k1Signature {
    /// The recovery id (y parity), 0 or 1.
    #[must_use]
    pub const fn recovery_id(&self) -> u8 {
        self.recovery_id
    }

    /// The 64-byte `r || s` body.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// 65 bytes `r || s || v` with `v = 27 + recovery_id`, the encoding used
    /// for personal-message and EIP-712 signatures.
    #[must_use]
    pub fn to_rsv_bytes(&self) -> [u8; 65] {
        let mut result = [0u8; 65];
        result[..64].copy_from_slice(&self.bytes);
        result[64] = 27 + self.recovery_id;
        result
    }

    /// Convert into an alloy signature for transaction encoding.
    #[must_use]
    pub fn to_alloy(&self) -> Signature {
        let r = U256::from_be_slice(&self.bytes[..32]);
        let s = U256::from_be_slice(&self.bytes[32..]);
        Signature::new(r, s, self.recovery_id == 1)
    }
}

impl std::fmt::Debug for Secp256k1Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1Signature")
            .field("rs", &hex::encode(self.bytes))
            .field("recovery_id", &self.recovery_id)
            .finish()
    }
}

// ============================================================================
// Secp256k1KeyPair
// ============================================================================

/// A secp256k1 signing key with its cached public key.
///
/// Signing takes `&self` and keeps no mutable state, so one key pair can
/// serve concurrent requests.
#[allow(clippy::struct_field_names)]
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    public_key: Secp256k1PublicKey,
}

impl Secp256k1KeyPair {
    /// Generate a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Create a key pair from a [`SecretKey`].
    ///
    /// # Errors
    ///
    /// Returns [`SignError::InvalidKey`] if the bytes are zero or not below
    /// the curve order.
    pub fn from_secret_key(secret: &SecretKey) -> Result<Self, SignError> {
        let signing_key =
            SigningKey::from_bytes(secret.as_bytes().into()).map_err(|_| SignError::InvalidKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        let public_key = Secp256k1PublicKey::from_verifying_key(&verifying_key);
        Self {
            signing_key,
            verifying_key,
            public_key,
        }
    }

    /// Copy the private scalar out into a [`SecretKey`].
    #[must_use]
    pub fn secret_key(&self) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.signing_key.to_bytes());
        SecretKey::new(bytes)
    }

    /// The public key.
    #[must_use]
    pub const fn public_key(&self) -> &Secp256k1PublicKey {
        &self.public_key
    }

    /// Sign a 32-byte prehash, producing a low-S recoverable signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::SignatureFailed`] if the ECDSA operation fails.
    pub fn sign(&self, hash: &[u8; 32]) -> Result<Secp256k1Signature, SignError> {
        let (signature, recovery_id): (K256Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|_| SignError::signature_failed("secp256k1 signing failed"))?;

        let normalized = signature.normalize_s();

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&normalized.unwrap_or(signature).to_bytes());

        // Normalizing S negates the point, which flips the parity.
        let recovery_id = if normalized.is_some() {
            recovery_id.to_byte() ^ 1
        } else {
            recovery_id.to_byte()
        };

        Ok(Secp256k1Signature { bytes, recovery_id })
    }

    /// Verify a signature against a prehash with this key pair's public key.
    #[must_use]
    pub fn verify(&self, hash: &[u8; 32], signature: &Secp256k1Signature) -> bool {
        use k256::ecdsa::signature::hazmat::PrehashVerifier;

        let Ok(k256_sig) = K256Signature::from_slice(signature.as_bytes()) else {
            return false;
        };

        self.verifying_key.verify_prehash(hash, &k256_sig).is_ok()
    }
}

impl std::fmt::Debug for Secp256k1KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use alloy_primitives::B256;

    // Well-known test vector (web3 docs / ethers test key).
    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const TEST_ADDRESS: &str = "2c7536e3605d9c16a7a3d7b1898e529396a65c23";

    fn test_keypair() -> Secp256k1KeyPair {
        let secret = SecretKey::from_hex(TEST_KEY).unwrap();
        Secp256k1KeyPair::from_secret_key(&secret).unwrap()
    }

    #[test]
    fn test_known_address() {
        let keypair = test_keypair();
        assert_eq!(keypair.public_key().keystore_address(), TEST_ADDRESS);
    }

    #[test]
    fn test_from_secret_key_rejects_zero() {
        let secret = SecretKey::new([0u8; 32]);
        assert!(matches!(
            Secp256k1KeyPair::from_secret_key(&secret),
            Err(SignError::InvalidKey)
        ));
    }

    #[test]
    fn test_secret_key_round_trip() {
        let keypair = Secp256k1KeyPair::generate();
        let again = Secp256k1KeyPair::from_secret_key(&keypair.secret_key()).unwrap();
        assert_eq!(again.public_key(), keypair.public_key());
    }

    #[test]
    fn test_sign_is_low_s_and_verifies() {
        let keypair = test_keypair();
        for i in 0u8..16 {
            let hash = [i; 32];
            let sig = keypair.sign(&hash).unwrap();
            assert!(keypair.verify(&hash, &sig));
            let k = K256Signature::from_slice(sig.as_bytes()).unwrap();
            assert!(k.normalize_s().is_none(), "signature must already be low-S");
        }
    }

    #[test]
    fn test_recovered_address_matches() {
        let keypair = test_keypair();
        let hash = [0x42u8; 32];
        let sig = keypair.sign(&hash).unwrap();
        let recovered = sig
            .to_alloy()
            .recover_address_from_prehash(&B256::from(hash))
            .unwrap();
        assert_eq!(recovered, keypair.public_key().ethereum_address());
    }

    #[test]
    fn test_rsv_bytes_use_27_offset() {
        let keypair = test_keypair();
        let sig = keypair.sign(&[1u8; 32]).unwrap();
        let rsv = sig.to_rsv_bytes();
        assert!(rsv[64] == 27 || rsv[64] == 28);
        assert_eq!(&rsv[..64], sig.as_bytes());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let keypair = test_keypair();
        let debug = format!("{keypair:?}");
        assert!(!debug.contains(TEST_KEY));
    }
}

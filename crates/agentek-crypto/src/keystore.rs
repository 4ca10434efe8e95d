//! Keyfile codec: a standard V3 keystore plus an encrypted policy.
//!
//! One scrypt derivation produces a 32-byte key `dk` that is sliced three
//! ways:
//!
//! ```text
//!  dk[0..16]   AES-128-CTR key for the private key      (V3 keystore)
//!  dk[16..32]  MAC key: keccak256(dk[16..32] || ciphertext)  (V3 keystore)
//!  dk[0..32]   AES-256-GCM key for the JSON policy
//! ```
//!
//! The `keystore` half is byte-compatible with other V3 tooling and can be
//! lifted out of the file on its own. The slicing is part of the on-disk
//! format and must not change.
//!
//! # Keyfile Format
//!
//! ```json
//! {
//!   "keystore": {
//!     "version": 3,
//!     "id": "<uuid v4>",
//!     "address": "<lowercase hex, no 0x>",
//!     "crypto": {
//!       "cipher": "aes-128-ctr",
//!       "ciphertext": "<hex>",
//!       "cipherparams": { "iv": "<16 bytes hex>" },
//!       "kdf": "scrypt",
//!       "kdfparams": { "n": 16384, "r": 8, "p": 1, "dklen": 32, "salt": "<32 bytes hex>" },
//!       "mac": "<hex>"
//!     }
//!   },
//!   "encryptedPolicy": { "ciphertext": "<hex>", "iv": "<12 bytes hex>", "tag": "<16 bytes hex>" }
//! }
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use agentek_core::types::PolicyConfig;
//! use agentek_crypto::keypair::Secp256k1KeyPair;
//! use agentek_crypto::keystore::{decrypt, encrypt, DecryptedPayload};
//!
//! let payload = DecryptedPayload {
//!     private_key: Secp256k1KeyPair::generate().secret_key(),
//!     policy: PolicyConfig::default(),
//! };
//!
//! let keyfile = encrypt(&payload, "correct horse").expect("encryption failed");
//! let opened = decrypt(&keyfile, "correct horse").expect("decryption failed");
//! assert_eq!(opened, payload);
//! ```

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::keypair::Secp256k1KeyPair;
use crate::keys::{SecretKey, SECRET_KEY_LEN};
use agentek_core::error::StoreError;
use agentek_core::types::PolicyConfig;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

// ============================================================================
// Constants
// ============================================================================

/// Keystore format version.
pub const KEYSTORE_VERSION: u32 = 3;

/// Cipher name for the private key.
pub const KEY_CIPHER: &str = "aes-128-ctr";

/// KDF name.
pub const KDF: &str = "scrypt";

/// scrypt cost parameter N.
pub const SCRYPT_N: u64 = 16_384;

/// scrypt block size r.
pub const SCRYPT_R: u32 = 8;

/// scrypt parallelism p.
pub const SCRYPT_P: u32 = 1;

/// Derived key length in bytes.
pub const DKLEN: usize = 32;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// AES-CTR IV length in bytes.
pub const CTR_IV_LEN: usize = 16;

/// AES-GCM IV length in bytes.
pub const GCM_IV_LEN: usize = 12;

/// AES-GCM tag length in bytes.
pub const GCM_TAG_LEN: usize = 16;

/// Upper bound on scrypt memory (`128 * n * r * p` bytes) accepted on decrypt.
pub const SCRYPT_MAX_MEMORY: u64 = 64 * 1024 * 1024;

// ============================================================================
// Types
// ============================================================================

/// The decrypted contents of a keyfile. Never serialized.
#[derive(Debug, PartialEq, Eq)]
pub struct DecryptedPayload {
    /// The signing key.
    pub private_key: SecretKey,
    /// The signing policy.
    pub policy: PolicyConfig,
}

/// The persisted keyfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentekKeyfile {
    /// Standard V3 keystore holding the private key.
    pub keystore: V3Keystore,
    /// The policy, encrypted under the same derived key.
    #[serde(rename = "encryptedPolicy")]
    pub encrypted_policy: EncryptedPolicy,
}

/// A V3 keystore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V3Keystore {
    /// Always 3.
    pub version: u32,
    /// Random UUID v4.
    pub id: String,
    /// Address of the key, lowercase hex without `0x`.
    pub address: String,
    /// Cipher and KDF parameters.
    pub crypto: KeystoreCrypto,
}

/// The `crypto` section of a V3 keystore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    /// `aes-128-ctr`
    pub cipher: String,
    /// Encrypted private key, hex.
    pub ciphertext: String,
    /// Cipher parameters.
    pub cipherparams: CipherParams,
    /// `scrypt`
    pub kdf: String,
    /// KDF parameters.
    pub kdfparams: ScryptParams,
    /// `keccak256(dk[16..32] || ciphertext)`, hex.
    pub mac: String,
}

/// AES-CTR parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    /// 16-byte IV, hex.
    pub iv: String,
}

/// scrypt parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptParams {
    /// Cost parameter N.
    pub n: u64,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
    /// Derived key length.
    pub dklen: usize,
    /// Salt, hex.
    pub salt: String,
}

/// The AES-256-GCM encrypted policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPolicy {
    /// Encrypted policy JSON, hex.
    pub ciphertext: String,
    /// 12-byte IV, hex.
    pub iv: String,
    /// 16-byte authentication tag, hex.
    pub tag: String,
}

// ============================================================================
// Key Derivation
// ============================================================================

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    n: u64,
    r: u32,
    p: u32,
) -> Result<Zeroizing<[u8; DKLEN]>, StoreError> {
    let log_n = u8::try_from(n.trailing_zeros())
        .map_err(|_| StoreError::invalid_format("scrypt n out of range"))?;
    let params = scrypt::Params::new(log_n, r, p, DKLEN)
        .map_err(|e| StoreError::invalid_format(format!("unsupported scrypt parameters: {e}")))?;

    let mut dk = Zeroizing::new([0u8; DKLEN]);
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut dk[..])
        .map_err(|e| StoreError::invalid_format(format!("scrypt failed: {e}")))?;
    Ok(dk)
}

fn compute_mac(dk: &[u8; DKLEN], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(&dk[16..32]);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

fn apply_ctr(dk: &[u8; DKLEN], iv: &[u8], buffer: &mut [u8]) -> Result<(), StoreError> {
    let mut cipher = Aes128Ctr::new_from_slices(&dk[..16], iv)
        .map_err(|_| StoreError::invalid_format("bad AES-CTR key or IV length"))?;
    cipher.apply_keystream(buffer);
    Ok(())
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

// ============================================================================
// Encryption / Decryption
// ============================================================================

/// Encrypt a key and policy under a passphrase.
///
/// Every call draws a fresh salt and fresh IVs, so encrypting the same
/// payload twice never yields the same file.
///
/// # Errors
///
/// Returns [`StoreError::EncryptionFailed`] if the private key is not a
/// valid secp256k1 scalar or a cipher fails.
pub fn encrypt(payload: &DecryptedPayload, passphrase: &str) -> Result<AgentekKeyfile, StoreError> {
    // 1. The address must be derivable from the key alone
    let keypair = Secp256k1KeyPair::from_secret_key(&payload.private_key)
        .map_err(|_| StoreError::encryption_failed("private key is not a valid secp256k1 key"))?;
    let address = keypair.public_key().keystore_address();

    // 2. One scrypt pass
    let salt: [u8; SALT_LEN] = random_bytes();
    let dk = derive_key(passphrase, &salt, SCRYPT_N, SCRYPT_R, SCRYPT_P)?;

    // 3. Private key under AES-128-CTR with dk[0..16]
    let ctr_iv: [u8; CTR_IV_LEN] = random_bytes();
    let mut key_ciphertext = payload.private_key.as_bytes().to_vec();
    apply_ctr(&dk, &ctr_iv, &mut key_ciphertext)?;

    // 4. MAC over the ciphertext with dk[16..32]
    let mac = compute_mac(&dk, &key_ciphertext);

    // 5. Policy under AES-256-GCM with the full dk
    let gcm_iv: [u8; GCM_IV_LEN] = random_bytes();
    let mut policy_buf = Zeroizing::new(
        serde_json::to_vec(&payload.policy)
            .map_err(|e| StoreError::encryption_failed(format!("policy serialization: {e}")))?,
    );
    let cipher = Aes256Gcm::new_from_slice(&dk[..])
        .map_err(|_| StoreError::encryption_failed("bad AES-GCM key length"))?;
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&gcm_iv), b"", &mut policy_buf[..])
        .map_err(|_| StoreError::encryption_failed("AES-GCM encryption failed"))?;

    Ok(AgentekKeyfile {
        keystore: V3Keystore {
            version: KEYSTORE_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            address,
            crypto: KeystoreCrypto {
                cipher: KEY_CIPHER.to_string(),
                ciphertext: hex::encode(&key_ciphertext),
                cipherparams: CipherParams {
                    iv: hex::encode(ctr_iv),
                },
                kdf: KDF.to_string(),
                kdfparams: ScryptParams {
                    n: SCRYPT_N,
                    r: SCRYPT_R,
                    p: SCRYPT_P,
                    dklen: DKLEN,
                    salt: hex::encode(salt),
                },
                mac: hex::encode(mac),
            },
        },
        encrypted_policy: EncryptedPolicy {
            ciphertext: hex::encode(policy_buf.as_slice()),
            iv: hex::encode(gcm_iv),
            tag: hex::encode(tag),
        },
    })
}

/// Decrypt a keyfile.
///
/// # Errors
///
/// Returns [`StoreError::InvalidFormat`] for unsupported versions, ciphers,
/// KDFs or parameters, and for malformed hex.
///
/// Returns [`StoreError::DecryptionFailed`] when the MAC does not match,
/// the decrypted key does not match the stored address, or the policy tag
/// does not verify. These cases are indistinguishable to the caller.
pub fn decrypt(keyfile: &AgentekKeyfile, passphrase: &str) -> Result<DecryptedPayload, StoreError> {
    let crypto = &keyfile.keystore.crypto;
    let kdfparams = &crypto.kdfparams;

    // 1. Check format
    check_format(keyfile)?;

    let salt = decode_hex("kdfparams.salt", &kdfparams.salt)?;
    let ctr_iv = decode_hex_len("cipherparams.iv", &crypto.cipherparams.iv, CTR_IV_LEN)?;
    let key_ciphertext = decode_hex_len("ciphertext", &crypto.ciphertext, SECRET_KEY_LEN)?;
    let stored_mac = decode_hex_len("mac", &crypto.mac, 32)?;

    let policy = &keyfile.encrypted_policy;
    let gcm_iv = decode_hex_len("encryptedPolicy.iv", &policy.iv, GCM_IV_LEN)?;
    let tag = decode_hex_len("encryptedPolicy.tag", &policy.tag, GCM_TAG_LEN)?;
    let mut policy_buf = Zeroizing::new(decode_hex("encryptedPolicy.ciphertext", &policy.ciphertext)?);

    // 2. Re-derive dk from the stored parameters
    let dk = derive_key(passphrase, &salt, kdfparams.n, kdfparams.r, kdfparams.p)?;

    // 3. MAC before anything is decrypted
    let mac = compute_mac(&dk, &key_ciphertext);
    if !bool::from(mac.as_slice().ct_eq(stored_mac.as_slice())) {
        return Err(StoreError::DecryptionFailed);
    }

    // 4. Private key
    let mut key_bytes = Zeroizing::new([0u8; SECRET_KEY_LEN]);
    key_bytes.copy_from_slice(&key_ciphertext);
    apply_ctr(&dk, &ctr_iv, &mut key_bytes[..])?;
    let private_key = SecretKey::new(*key_bytes);

    let derived_address = Secp256k1KeyPair::from_secret_key(&private_key)
        .map_err(|_| StoreError::DecryptionFailed)?
        .public_key()
        .keystore_address();
    if !derived_address.eq_ignore_ascii_case(keyfile.keystore.address.trim_start_matches("0x")) {
        return Err(StoreError::DecryptionFailed);
    }

    // 5. Policy, authenticated independently of the MAC
    let cipher = Aes256Gcm::new_from_slice(&dk[..]).map_err(|_| StoreError::DecryptionFailed)?;
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&gcm_iv),
            b"",
            &mut policy_buf[..],
            Tag::from_slice(&tag),
        )
        .map_err(|_| StoreError::DecryptionFailed)?;

    let policy: PolicyConfig = serde_json::from_slice(&policy_buf)
        .map_err(|e| StoreError::invalid_format(format!("decrypted policy is not valid JSON: {e}")))?;

    Ok(DecryptedPayload {
        private_key,
        policy,
    })
}

/// Replace the policy in a keyfile.
///
/// The whole file is re-encrypted with a fresh salt and fresh IVs; the
/// returned keyfile shares nothing but the key and address with the input.
///
/// # Errors
///
/// Everything [`decrypt`] and [`encrypt`] can return.
pub fn rewrap_policy(
    keyfile: &AgentekKeyfile,
    passphrase: &str,
    policy: PolicyConfig,
) -> Result<AgentekKeyfile, StoreError> {
    let mut payload = decrypt(keyfile, passphrase)?;
    payload.policy = policy;
    encrypt(&payload, passphrase)
}

fn check_format(keyfile: &AgentekKeyfile) -> Result<(), StoreError> {
    let keystore = &keyfile.keystore;
    let params = &keystore.crypto.kdfparams;

    if keystore.version != KEYSTORE_VERSION {
        return Err(StoreError::invalid_format(format!(
            "unsupported keystore version {}",
            keystore.version
        )));
    }
    if keystore.crypto.cipher != KEY_CIPHER {
        return Err(StoreError::invalid_format(format!(
            "unsupported cipher {}",
            keystore.crypto.cipher
        )));
    }
    if keystore.crypto.kdf != KDF {
        return Err(StoreError::invalid_format(format!(
            "unsupported kdf {}",
            keystore.crypto.kdf
        )));
    }
    if params.dklen != DKLEN {
        return Err(StoreError::invalid_format(format!(
            "unsupported dklen {}",
            params.dklen
        )));
    }
    if params.n < 2 || !params.n.is_power_of_two() {
        return Err(StoreError::invalid_format(format!(
            "scrypt n must be a power of two, got {}",
            params.n
        )));
    }
    let memory = 128u64
        .saturating_mul(params.n)
        .saturating_mul(u64::from(params.r))
        .saturating_mul(u64::from(params.p));
    if memory > SCRYPT_MAX_MEMORY {
        return Err(StoreError::invalid_format(format!(
            "scrypt parameters need {memory} bytes, limit is {SCRYPT_MAX_MEMORY}"
        )));
    }
    Ok(())
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, StoreError> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|_| StoreError::invalid_format(format!("{field} is not valid hex")))
}

fn decode_hex_len(field: &str, value: &str, len: usize) -> Result<Vec<u8>, StoreError> {
    let bytes = decode_hex(field, value)?;
    if bytes.len() != len {
        return Err(StoreError::invalid_format(format!(
            "{field} must be {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

// ============================================================================
// Tests
// ============================================================================

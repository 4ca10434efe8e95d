//! Passphrase and secret input for CLI commands.
//!
//! Two input modes:
//! 1. **Environment variable**: `AGENTEK_PASSPHRASE` (and `AGENTEK_PRIVATE_KEY`
//!    for `init --import`) for non-interactive use
//! 2. **Interactive prompt**: hidden input via `rpassword` on the terminal
//!
//! Environment variables can be read by other processes of the same user
//! (`/proc/<pid>/environ` on Linux). Prefer the prompt on shared machines.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Environment variable holding the keyfile passphrase.
pub const PASSPHRASE_ENV: &str = "AGENTEK_PASSPHRASE";

/// Environment variable holding a hex private key for `init --import`.
pub const PRIVATE_KEY_ENV: &str = "AGENTEK_PRIVATE_KEY";

/// Minimum length for a new passphrase.
pub const MIN_PASSPHRASE_LENGTH: usize = 8;

/// Errors that can occur while reading secrets.
#[derive(Debug, thiserror::Error)]
pub enum PassphraseError {
    /// The input was empty.
    #[error("passphrase cannot be empty")]
    Empty,

    /// A new passphrase is shorter than the minimum.
    #[error("passphrase must be at least {min} characters")]
    TooShort {
        /// Minimum required length.
        min: usize,
    },

    /// Confirmation did not match.
    #[error("passphrases do not match")]
    Mismatch,

    /// Input was closed before anything was entered.
    #[error("input cancelled")]
    Cancelled,

    /// Terminal I/O failed.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the passphrase that unlocks an existing keyfile.
///
/// # Errors
///
/// Returns [`PassphraseError`] if the input is empty or the prompt fails.
pub fn read_passphrase() -> Result<Zeroizing<String>, PassphraseError> {
    if let Some(value) = take_env(PASSPHRASE_ENV) {
        if value.is_empty() {
            return Err(PassphraseError::Empty);
        }
        return Ok(value);
    }

    let passphrase = prompt("Passphrase: ")?;
    if passphrase.is_empty() {
        return Err(PassphraseError::Cancelled);
    }
    Ok(passphrase)
}

/// Read a new passphrase, with confirmation when interactive.
///
/// # Errors
///
/// Returns [`PassphraseError`] if the passphrase is too short, the
/// confirmation does not match, or the prompt fails.
pub fn read_new_passphrase() -> Result<Zeroizing<String>, PassphraseError> {
    if let Some(value) = take_env(PASSPHRASE_ENV) {
        check_new_passphrase(&value)?;
        return Ok(value);
    }

    let passphrase = prompt("New passphrase: ")?;
    if passphrase.is_empty() {
        return Err(PassphraseError::Cancelled);
    }
    check_new_passphrase(&passphrase)?;

    let confirmation = prompt("Confirm passphrase: ")?;
    if !constant_time_eq(confirmation.as_bytes(), passphrase.as_bytes()) {
        return Err(PassphraseError::Mismatch);
    }
    Ok(passphrase)
}

/// Read a hex private key to import, without echoing it.
///
/// # Errors
///
/// Returns [`PassphraseError`] if nothing was entered or the prompt fails.
pub fn read_private_key() -> Result<Zeroizing<String>, PassphraseError> {
    let value = match take_env(PRIVATE_KEY_ENV) {
        Some(value) => value,
        None => prompt("Private key (hex): ")?,
    };
    if value.trim().is_empty() {
        return Err(PassphraseError::Empty);
    }
    Ok(value)
}

/// Length and emptiness rules for a new passphrase.
///
/// # Errors
///
/// Returns [`PassphraseError::Empty`] or [`PassphraseError::TooShort`].
pub fn check_new_passphrase(passphrase: &str) -> Result<(), PassphraseError> {
    if passphrase.is_empty() {
        return Err(PassphraseError::Empty);
    }
    if passphrase.chars().count() < MIN_PASSPHRASE_LENGTH {
        return Err(PassphraseError::TooShort {
            min: MIN_PASSPHRASE_LENGTH,
        });
    }
    Ok(())
}

fn prompt(label: &str) -> Result<Zeroizing<String>, PassphraseError> {
    rpassword::prompt_password(label)
        .map(Zeroizing::new)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                PassphraseError::Cancelled
            } else {
                PassphraseError::Io(e)
            }
        })
}

/// Read and clear an environment variable so child processes do not
/// inherit it. Called before the runtime spawns any threads.
fn take_env(var: &str) -> Option<Zeroizing<String>> {
    let value = std::env::var(var).ok().map(Zeroizing::new);
    if value.is_some() {
        std::env::remove_var(var);
        tracing::debug!(var, "read secret from environment");
    }
    value
}

/// Serializes tests that touch the secret environment variables, which are
/// process-global.
#[cfg(test)]
pub(crate) static TEST_ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

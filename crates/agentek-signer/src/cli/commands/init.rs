//! # Init Command
//!
//! Creates the base directory and the encrypted keyfile:
//!
//! ```text
//! ~/.agentek/            (0700)
//! ├── config.toml
//! └── keyfile.enc        (0600)
//! ```
//!
//! The key is generated, or imported from `AGENTEK_PRIVATE_KEY` / a hidden
//! prompt with `--import`. The keyfile starts out with the default policy.

use agentek_core::config_loader::ConfigLoader;
use agentek_core::types::PolicyConfig;
use agentek_crypto::{
    encrypt, keyfile_exists, write_keyfile, DecryptedPayload, Secp256k1KeyPair, SecretKey,
};
use alloy_primitives::Address;
use tracing::info;

use super::CommandError;
use crate::cli::passphrase::{read_new_passphrase, read_private_key};
use crate::server::{daemon_status, PidStatus};

/// `agentek-signer init`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitCommand {
    /// Import a key instead of generating one.
    pub import: bool,
    /// Replace an existing keyfile.
    pub force: bool,
}

impl InitCommand {
    /// Run the command and return the new key's address.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::AlreadyInitialized`] if a keyfile exists and
    /// `force` is not set, [`CommandError::DaemonRunning`] if a daemon is
    /// using the current keyfile, and input, encryption or I/O errors.
    pub fn run(&self, loader: &ConfigLoader) -> Result<Address, CommandError> {
        let paths = loader.paths();

        if keyfile_exists(&paths.keyfile) {
            if !self.force {
                return Err(CommandError::AlreadyInitialized(paths.keyfile));
            }
            if let PidStatus::Running(pid) = daemon_status(&paths)? {
                return Err(CommandError::DaemonRunning(pid));
            }
        }

        let private_key = if self.import {
            let hex = read_private_key()?;
            SecretKey::from_hex(&hex).map_err(|_| {
                CommandError::InvalidInput("private key must be 32 bytes of hex".into())
            })?
        } else {
            SecretKey::generate()
        };
        let address = Secp256k1KeyPair::from_secret_key(&private_key)?
            .public_key()
            .ethereum_address();

        let passphrase = read_new_passphrase()?;
        let payload = DecryptedPayload {
            private_key,
            policy: PolicyConfig::default(),
        };
        let keyfile = encrypt(&payload, &passphrase)?;
        write_keyfile(&paths.keyfile, &keyfile)?;

        if !loader.exists() {
            loader.write_default()?;
        }

        info!(%address, keyfile = %paths.keyfile.display(), "keyfile created");
        println!("Keyfile written to {}", paths.keyfile.display());
        println!("Address: {address}");
        Ok(address)
    }
}

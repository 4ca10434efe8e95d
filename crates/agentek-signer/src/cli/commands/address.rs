//! # Address Command
//!
//! Asks the running daemon for the address of its key. Nothing is
//! decrypted locally.

use agentek_core::config::Config;
use agentek_core::config_loader::ConfigLoader;
use alloy_primitives::Address;

use super::{runtime, CommandError};
use crate::client::SignerClient;

/// `agentek-signer address`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressCommand;

impl AddressCommand {
    /// Print and return the daemon's checksummed address.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Client`] if the daemon is unreachable or
    /// answers with an error.
    pub fn run(&self, loader: &ConfigLoader, config: &Config) -> Result<Address, CommandError> {
        let client = SignerClient::from_config(loader.paths().socket, &config.client);
        let address = runtime()?.block_on(client.address())?;
        println!("{}", address.to_checksum(None));
        Ok(address)
    }
}

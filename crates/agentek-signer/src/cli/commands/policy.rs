//! # Policy Command
//!
//! `policy show` decrypts the keyfile and prints the policy as JSON.
//! `policy set <FILE>` validates a JSON policy and re-encrypts the keyfile
//! with it. A running daemon keeps its old policy until restarted.

use std::path::Path;

use agentek_core::config_loader::ConfigLoader;
use agentek_core::types::PolicyConfig;
use agentek_crypto::{decrypt, keyfile_exists, read_keyfile, rewrap_policy, write_keyfile};
use tracing::info;

use super::CommandError;
use crate::cli::args::PolicyAction;
use crate::cli::passphrase::read_passphrase;
use crate::server::daemon_status;

/// `agentek-signer policy`.
#[derive(Debug, Clone)]
pub struct PolicyCommand {
    /// What to do.
    pub action: PolicyAction,
}

impl PolicyCommand {
    /// Run the action and return the policy now stored in the keyfile.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotInitialized`] without a keyfile,
    /// [`CommandError::InvalidInput`] for an unreadable or malformed policy
    /// file, [`CommandError::Policy`] for an invalid policy and
    /// [`CommandError::Store`] for a wrong passphrase.
    pub fn run(&self, loader: &ConfigLoader) -> Result<PolicyConfig, CommandError> {
        let paths = loader.paths();
        if !keyfile_exists(&paths.keyfile) {
            return Err(CommandError::NotInitialized(paths.keyfile));
        }

        match &self.action {
            PolicyAction::Show => {
                let keyfile = read_keyfile(&paths.keyfile)?;
                let passphrase = read_passphrase()?;
                let policy = decrypt(&keyfile, &passphrase)?.policy;
                println!("{}", to_pretty_json(&policy)?);
                Ok(policy)
            }
            PolicyAction::Set { file } => {
                let policy = load_policy_file(file)?;
                policy.validate()?;

                let keyfile = read_keyfile(&paths.keyfile)?;
                let passphrase = read_passphrase()?;
                let updated = rewrap_policy(&keyfile, &passphrase, policy.clone())?;
                write_keyfile(&paths.keyfile, &updated)?;
                info!(keyfile = %paths.keyfile.display(), "policy updated");

                println!("Policy updated in {}", paths.keyfile.display());
                if let Some(pid) = daemon_status(&paths)?.pid() {
                    println!("Daemon (pid {pid}) keeps its old policy until restarted.");
                }
                Ok(policy)
            }
        }
    }
}

fn load_policy_file(path: &Path) -> Result<PolicyConfig, CommandError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CommandError::InvalidInput(format!("cannot read {}: {e}", path.display()))
    })?;
    let policy: PolicyConfig = serde_json::from_str(&content).map_err(|e| {
        CommandError::InvalidInput(format!("{} is not a valid policy: {e}", path.display()))
    })?;
    Ok(policy.normalized())
}

fn to_pretty_json(policy: &PolicyConfig) -> Result<String, CommandError> {
    serde_json::to_string_pretty(policy)
        .map_err(|e| CommandError::InvalidInput(format!("cannot render policy: {e}")))
}

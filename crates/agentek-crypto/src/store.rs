//! Keyfile persistence.
//!
//! - The keyfile is written with mode 0600 and its directory with 0700,
//!   created on demand
//! - Writes go through a temp file and a rename, so a crash never leaves a
//!   half-written keyfile behind
//! - The store only moves [`AgentekKeyfile`] JSON; encryption happens in
//!   [`keystore`](crate::keystore)
//!
//! # Example
//!
//! ```no_run
//! use agentek_core::types::PolicyConfig;
//! use agentek_crypto::keypair::Secp256k1KeyPair;
//! use agentek_crypto::keystore::{encrypt, DecryptedPayload};
//! use agentek_crypto::store::KeyfileStore;
//!
//! let store = KeyfileStore::new("/home/me/.agentek/keyfile.enc");
//! let payload = DecryptedPayload {
//!     private_key: Secp256k1KeyPair::generate().secret_key(),
//!     policy: PolicyConfig::default(),
//! };
//! store.create(&encrypt(&payload, "pass").expect("encrypt")).expect("write");
//! assert!(store.exists());
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use agentek_core::error::StoreError;
use tracing::debug;

use crate::keystore::AgentekKeyfile;

/// Mode of the keyfile.
pub const KEYFILE_MODE: u32 = 0o600;

/// Mode of the directory holding the keyfile.
pub const KEYFILE_DIR_MODE: u32 = 0o700;

/// Reads and writes one keyfile.
#[derive(Debug, Clone)]
pub struct KeyfileStore {
    path: PathBuf,
}

impl KeyfileStore {
    /// Creates a store for the keyfile at `path`. Nothing touches the disk yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The keyfile path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the keyfile exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Reads and parses the keyfile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyfileNotFound`] if there is no file and
    /// [`StoreError::InvalidFormat`] if it is not keyfile JSON.
    pub fn read(&self) -> Result<AgentekKeyfile, StoreError> {
        if !self.exists() {
            return Err(StoreError::keyfile_not_found(self.path.display().to_string()));
        }

        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::invalid_format(format!("keyfile is not valid JSON: {e}")))
    }

    /// Writes the keyfile, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoError`] or [`StoreError::PermissionDenied`] if
    /// the directory or file cannot be written.
    pub fn write(&self, keyfile: &AgentekKeyfile) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        ensure_private_dir(dir)?;

        let json = serde_json::to_string_pretty(keyfile)
            .map_err(|e| StoreError::encryption_failed(format!("keyfile serialization: {e}")))?;

        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "keyfile".into(), |n| n.to_string_lossy().into_owned());
        let temp_path = dir.join(format!(".{file_name}.tmp"));

        {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(KEYFILE_MODE);

            let mut file = options.open(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        // mode() only applies on creation; a leftover temp file keeps its mode
        #[cfg(unix)]
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(KEYFILE_MODE))?;

        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), "keyfile written");
        Ok(())
    }

    /// Writes the keyfile only if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyfileExists`] if a keyfile is already present,
    /// otherwise everything [`write`](Self::write) can return.
    pub fn create(&self, keyfile: &AgentekKeyfile) -> Result<(), StoreError> {
        if self.exists() {
            return Err(StoreError::keyfile_exists(self.path.display().to_string()));
        }
        self.write(keyfile)
    }
}

/// Returns true if a keyfile exists at `path`.
#[must_use]
pub fn keyfile_exists(path: &Path) -> bool {
    KeyfileStore::new(path).exists()
}

/// Reads the keyfile at `path`.
///
/// # Errors
///
/// See [`KeyfileStore::read`].
pub fn read_keyfile(path: &Path) -> Result<AgentekKeyfile, StoreError> {
    KeyfileStore::new(path).read()
}

/// Writes `keyfile` to `path`, replacing any existing file.
///
/// # Errors
///
/// See [`KeyfileStore::write`].
pub fn write_keyfile(path: &Path, keyfile: &AgentekKeyfile) -> Result<(), StoreError> {
    KeyfileStore::new(path).write(keyfile)
}

/// Creates `dir` if needed and restricts it to the owner.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or chmod'ed.
pub fn ensure_private_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(KEYFILE_DIR_MODE))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::keypair::Secp256k1KeyPair;
    use crate::keystore::{decrypt, encrypt, DecryptedPayload};
    use agentek_core::types::PolicyConfig;
    use tempfile::TempDir;

    fn sample_keyfile(passphrase: &str) -> (AgentekKeyfile, DecryptedPayload) {
        let payload = DecryptedPayload {
            private_key: Secp256k1KeyPair::generate().secret_key(),
            policy: PolicyConfig::default(),
        };
        (encrypt(&payload, passphrase).unwrap(), payload)
    }

    #[test]
    fn test_missing_keyfile() {
        let temp = TempDir::new().unwrap();
        let store = KeyfileStore::new(temp.path().join("keyfile.enc"));
        assert!(!store.exists());
        assert!(matches!(store.read(), Err(StoreError::KeyfileNotFound { .. })));
    }

    #[test]
    fn test_write_read_decrypt() {
        let temp = TempDir::new().unwrap();
        let store = KeyfileStore::new(temp.path().join("keyfile.enc"));
        let (keyfile, payload) = sample_keyfile("pw");

        store.write(&keyfile).unwrap();
        assert!(store.exists());

        let read_back = store.read().unwrap();
        assert_eq!(read_back, keyfile);
        assert_eq!(decrypt(&read_back, "pw").unwrap(), payload);
    }

    #[test]
    fn test_create_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let store = KeyfileStore::new(temp.path().join("keyfile.enc"));
        let (keyfile, _) = sample_keyfile("pw");

        store.create(&keyfile).unwrap();
        assert!(matches!(
            store.create(&keyfile),
            Err(StoreError::KeyfileExists { .. })
        ));
        // write() is the explicit replace path
        store.write(&keyfile).unwrap();
    }

    #[test]
    fn test_invalid_json_is_format_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keyfile.enc");
        fs::write(&path, "{not json").unwrap();
        let store = KeyfileStore::new(path);
        assert!(matches!(store.read(), Err(StoreError::InvalidFormat { .. })));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = KeyfileStore::new(temp.path().join("keyfile.enc"));
        let (keyfile, _) = sample_keyfile("pw");
        store.write(&keyfile).unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["keyfile.enc".to_string()]);
    }

    #[test]
    fn test_path_functions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keyfile.enc");
        let (keyfile, _) = sample_keyfile("pw");

        assert!(!keyfile_exists(&path));
        write_keyfile(&path, &keyfile).unwrap();
        assert!(keyfile_exists(&path));
        assert_eq!(read_keyfile(&path).unwrap(), keyfile);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_and_directory_permissions() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("agentek");
        let store = KeyfileStore::new(dir.join("keyfile.enc"));
        let (keyfile, _) = sample_keyfile("pw");
        store.write(&keyfile).unwrap();

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700, "directory should be 0700");

        let file_mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600, "keyfile should be 0600");
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_directory_is_tightened() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("loose");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        ensure_private_dir(&dir).unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}

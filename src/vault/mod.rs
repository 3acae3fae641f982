//! Encrypted key/value store unlocked by a device-bound secret.
//!
//! The vault holds opaque byte values under namespaced string keys, sealed
//! at rest with a key derived from the device secret. Every mutating
//! operation is expected to be followed by [`Vault::persist`], which writes
//! the sealed file atomically (temp file + rename) so a crash mid-write
//! leaves the previous durable state intact.

mod cipher;
pub mod secret;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use secret::{CachedSecret, FileSecretSource, SecretSource};

#[cfg(feature = "keyring")]
pub use secret::KeyringSecretSource;

/// Vault failure taxonomy.
///
/// `AuthFailed` (wrong secret) is always distinct from `Corrupt` (the store
/// exists but cannot be read) and `Io` (filesystem trouble).
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault authentication failed (wrong device secret)")]
    AuthFailed,
    #[error("vault store is corrupt: {0}")]
    Corrupt(String),
    #[error("vault io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// An open, decrypted vault.
///
/// Only one handle per store file should be live at a time; callers are
/// expected to serialize operations (see `CredentialService`).
///
/// # Example
/// ```no_run
/// use ember::vault::Vault;
///
/// let mut vault = Vault::open(std::path::Path::new("/tmp/vault.hold"), b"secret")?;
/// vault.put("ms_access_token", b"token-bytes".to_vec());
/// vault.persist()?;
/// # Ok::<(), ember::vault::VaultError>(())
/// ```
#[derive(Debug)]
pub struct Vault {
    path: PathBuf,
    key: [u8; 32],
    salt: [u8; cipher::SALT_LEN],
    entries: BTreeMap<String, Vec<u8>>,
}

impl Vault {
    /// Open the vault at `path` with the device secret.
    ///
    /// A missing file transparently becomes an empty vault; an existing file
    /// sealed under a different secret fails with [`VaultError::AuthFailed`]
    /// and never yields partial data.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self, VaultError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "vault file missing, starting empty");
                let salt = cipher::fresh_salt();
                let key = cipher::derive_key(secret, &salt)?;
                return Ok(Self {
                    path: path.to_path_buf(),
                    key,
                    salt,
                    entries: BTreeMap::new(),
                });
            }
            Err(err) => return Err(VaultError::Io(err)),
        };

        let envelope = cipher::SealedEnvelope::from_json(&raw)?;
        let salt = cipher::decode_salt(&envelope.salt)?;
        let key = cipher::derive_key(secret, &salt)?;
        let plaintext = cipher::open_sealed(&key, &envelope)?;
        let entries: BTreeMap<String, Vec<u8>> = serde_json::from_slice(&plaintext)
            .map_err(|err| VaultError::Corrupt(format!("store parse failed: {err}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            key,
            salt,
            entries,
        })
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.insert(key.into(), value);
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seal the current contents and commit them durably.
    ///
    /// The sealed envelope is written to a sibling temp file first and then
    /// renamed over the store, so a partial write is never visible.
    pub fn persist(&self) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(&self.entries)
            .map_err(|err| VaultError::Corrupt(format!("store encode failed: {err}")))?;
        let envelope = cipher::seal(&self.key, &self.salt, &plaintext)?;
        let serialized = envelope.to_json()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        fs::write(&tmp, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(VaultError::Io(err));
        }
        debug!(path = %self.path.display(), entries = self.entries.len(), "vault persisted");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "vault".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

//! Device-bound secret sources for the vault.
//!
//! The secret is never generated or stored by the vault itself; it comes
//! from a [`SecretSource`] collaborator. [`CachedSecret`] keeps the secret
//! in memory for the process lifetime after the first retrieval, with an
//! explicit invalidate for callers that rotate it.

use std::io;
use std::sync::RwLock;

use super::VaultError;

/// Source of the device-bound secret.
///
/// Retrieval may fail; the failure surfaces to callers as a vault open
/// failure.
pub trait SecretSource: Send + Sync {
    fn device_secret(&self) -> Result<Vec<u8>, VaultError>;
}

/// Process-scoped secret cache over a [`SecretSource`].
///
/// The underlying source is consulted at most once until
/// [`CachedSecret::invalidate`] is called.
pub struct CachedSecret {
    source: Box<dyn SecretSource>,
    cell: RwLock<Option<Vec<u8>>>,
}

impl CachedSecret {
    pub fn new(source: Box<dyn SecretSource>) -> Self {
        Self {
            source,
            cell: RwLock::new(None),
        }
    }

    pub fn get(&self) -> Result<Vec<u8>, VaultError> {
        if let Some(secret) = self
            .cell
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Ok(secret.clone());
        }
        let secret = self.source.device_secret()?;
        let mut cell = self
            .cell
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another caller may have raced us here; first write wins.
        Ok(cell.get_or_insert(secret).clone())
    }

    pub fn invalidate(&self) {
        self.cell
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// Generate a fresh device secret: 32 CSPRNG bytes, base64-encoded.
pub(crate) fn generate_secret() -> String {
    use base64::engine::general_purpose::STANDARD_NO_PAD;
    use base64::Engine as _;
    use rand::RngCore;

    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    STANDARD_NO_PAD.encode(buf)
}

/// Device secret kept in a local file, created on first use.
///
/// The fallback for hosts without a usable keychain; the file lives next
/// to the vault in the application data directory.
pub struct FileSecretSource {
    path: std::path::PathBuf,
}

impl FileSecretSource {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretSource for FileSecretSource {
    fn device_secret(&self) -> Result<Vec<u8>, VaultError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw.trim().to_string().into_bytes()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let secret = generate_secret();
                if let Some(dir) = self.path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(&self.path, &secret)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
                }
                Ok(secret.into_bytes())
            }
            Err(err) => Err(VaultError::Io(err)),
        }
    }
}

/// Device secret backed by the OS credential store.
///
/// On first use a fresh 32-byte secret is generated from the system CSPRNG
/// and saved in the keychain; when the keychain refuses the write the
/// secret falls back to a local file next to the vault.
#[cfg(feature = "keyring")]
pub struct KeyringSecretSource {
    service: String,
    user: String,
    fallback_file: std::path::PathBuf,
}

#[cfg(feature = "keyring")]
impl KeyringSecretSource {
    pub fn new(
        service: impl Into<String>,
        user: impl Into<String>,
        fallback_file: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
            fallback_file: fallback_file.into(),
        }
    }
}

#[cfg(feature = "keyring")]
impl SecretSource for KeyringSecretSource {
    fn device_secret(&self) -> Result<Vec<u8>, VaultError> {
        let entry = keyring::Entry::new(&self.service, &self.user)
            .map_err(|err| VaultError::Io(io::Error::other(err.to_string())))?;

        if let Ok(secret) = entry.get_password() {
            return Ok(secret.into_bytes());
        }
        if let Ok(raw) = std::fs::read_to_string(&self.fallback_file) {
            return Ok(raw.trim().to_string().into_bytes());
        }

        let secret = generate_secret();
        if entry.set_password(&secret).is_err() {
            tracing::warn!("keychain rejected device secret, using file fallback");
            if let Some(dir) = self.fallback_file.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&self.fallback_file, &secret)?;
        }
        Ok(secret.into_bytes())
    }
}

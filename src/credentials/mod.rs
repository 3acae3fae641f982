//! Typed credential operations over the vault.
//!
//! Thin layer that owns the vault path and the cached device secret, and
//! serializes all vault access (single-flight per process). Token text is
//! stored as raw bytes, so a save/read round trip is byte-identical.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

use crate::vault::{CachedSecret, SecretSource, Vault, VaultError};

const ACCESS_TOKEN_KEY: &str = "ms_access_token";
const REFRESH_TOKEN_KEY: &str = "ms_refresh_token";

/// Which stored token to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn key(self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_TOKEN_KEY,
            TokenKind::Refresh => REFRESH_TOKEN_KEY,
        }
    }
}

/// Typed save/read/clear over the vault for credential fields.
///
/// Every mutating operation opens the vault, applies the change, and
/// persists before returning, so plaintext never outlives one operation.
///
/// # Example
/// ```no_run
/// use ember::credentials::{CredentialService, TokenKind};
/// use ember::vault::{SecretSource, VaultError};
///
/// struct Fixed;
/// impl SecretSource for Fixed {
///     fn device_secret(&self) -> Result<Vec<u8>, VaultError> {
///         Ok(b"secret".to_vec())
///     }
/// }
///
/// let creds = CredentialService::new("/tmp/vault.hold", Box::new(Fixed));
/// creds.save_tokens("access", Some("refresh"))?;
/// assert_eq!(creds.read_token(TokenKind::Refresh)?.as_deref(), Some("refresh"));
/// # Ok::<(), VaultError>(())
/// ```
pub struct CredentialService {
    vault_path: PathBuf,
    secret: CachedSecret,
    op_lock: Mutex<()>,
}

impl CredentialService {
    pub fn new(vault_path: impl Into<PathBuf>, source: Box<dyn SecretSource>) -> Self {
        Self {
            vault_path: vault_path.into(),
            secret: CachedSecret::new(source),
            op_lock: Mutex::new(()),
        }
    }

    /// Store the access token, and the refresh token when present.
    pub fn save_tokens(&self, access: &str, refresh: Option<&str>) -> Result<(), VaultError> {
        let _guard = self.lock();
        let mut vault = self.open_vault()?;
        vault.put(ACCESS_TOKEN_KEY, access.as_bytes().to_vec());
        if let Some(refresh) = refresh {
            vault.put(REFRESH_TOKEN_KEY, refresh.as_bytes().to_vec());
        }
        vault.persist()?;
        debug!(refresh = refresh.is_some(), "credentials saved");
        Ok(())
    }

    /// Read a stored token; `None` when it was never saved.
    pub fn read_token(&self, kind: TokenKind) -> Result<Option<String>, VaultError> {
        let _guard = self.lock();
        let vault = self.open_vault()?;
        match vault.get(kind.key()) {
            Some(bytes) => {
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| VaultError::Corrupt(format!("{} is not utf-8", kind.key())))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    /// Remove both tokens. A no-op when nothing is stored.
    pub fn clear_tokens(&self) -> Result<(), VaultError> {
        let _guard = self.lock();
        let mut vault = self.open_vault()?;
        vault.delete(ACCESS_TOKEN_KEY);
        vault.delete(REFRESH_TOKEN_KEY);
        vault.persist()?;
        Ok(())
    }

    /// Drop the cached device secret; the next operation refetches it.
    pub fn invalidate_secret(&self) {
        self.secret.invalidate();
    }

    fn open_vault(&self) -> Result<Vault, VaultError> {
        let secret = self.secret.get()?;
        Vault::open(&self.vault_path, &secret)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.op_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

mod support;

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use ember::credentials::{CredentialService, TokenKind};
use ember::vault::{SecretSource, VaultError};

use support::MemorySecretSource;

fn service_at(path: PathBuf) -> CredentialService {
    CredentialService::new(path, Box::new(MemorySecretSource(b"device-secret")))
}

#[test]
fn save_then_read_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let creds = service_at(dir.path().join("vault.hold"));

    creds
        .save_tokens("access-αβγ-token", Some("refresh-token-☂"))
        .unwrap();

    assert_eq!(
        creds.read_token(TokenKind::Access).unwrap().as_deref(),
        Some("access-αβγ-token")
    );
    assert_eq!(
        creds.read_token(TokenKind::Refresh).unwrap().as_deref(),
        Some("refresh-token-☂")
    );
}

#[test]
fn read_without_save_is_none() {
    let dir = TempDir::new().unwrap();
    let creds = service_at(dir.path().join("vault.hold"));

    assert_eq!(creds.read_token(TokenKind::Access).unwrap(), None);
    assert_eq!(creds.read_token(TokenKind::Refresh).unwrap(), None);
}

#[test]
fn save_without_refresh_leaves_previous_refresh() {
    let dir = TempDir::new().unwrap();
    let creds = service_at(dir.path().join("vault.hold"));

    creds.save_tokens("first-access", Some("refresh")).unwrap();
    creds.save_tokens("second-access", None).unwrap();

    assert_eq!(
        creds.read_token(TokenKind::Access).unwrap().as_deref(),
        Some("second-access")
    );
    assert_eq!(
        creds.read_token(TokenKind::Refresh).unwrap().as_deref(),
        Some("refresh")
    );
}

#[test]
fn clear_tokens_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let creds = service_at(dir.path().join("vault.hold"));

    creds.save_tokens("access", Some("refresh")).unwrap();
    creds.clear_tokens().unwrap();
    // Second clear on an empty store is a no-op, not an error.
    creds.clear_tokens().unwrap();

    assert_eq!(creds.read_token(TokenKind::Access).unwrap(), None);
    assert_eq!(creds.read_token(TokenKind::Refresh).unwrap(), None);
}

#[test]
fn tokens_survive_a_new_service_instance() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.hold");

    service_at(path.clone())
        .save_tokens("access", Some("refresh"))
        .unwrap();

    let reopened = service_at(path);
    assert_eq!(
        reopened.read_token(TokenKind::Refresh).unwrap().as_deref(),
        Some("refresh")
    );
}

#[test]
fn wrong_secret_is_auth_failed_not_partial_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.hold");

    service_at(path.clone())
        .save_tokens("access", Some("refresh"))
        .unwrap();

    let wrong = CredentialService::new(path, Box::new(MemorySecretSource(b"other-secret")));
    let err = wrong.read_token(TokenKind::Access).unwrap_err();
    assert!(matches!(err, VaultError::AuthFailed));
}

/// Secret source whose value changes between fetches, to observe the cache.
struct RotatingSource {
    values: std::sync::Mutex<Vec<&'static [u8]>>,
}

impl SecretSource for RotatingSource {
    fn device_secret(&self) -> Result<Vec<u8>, VaultError> {
        let mut values = self.values.lock().unwrap();
        let value = if values.len() > 1 {
            values.remove(0)
        } else {
            values[0]
        };
        Ok(value.to_vec())
    }
}

#[test]
fn secret_is_cached_until_invalidated() {
    let dir = TempDir::new().unwrap();
    let creds = CredentialService::new(
        dir.path().join("vault.hold"),
        Box::new(RotatingSource {
            values: std::sync::Mutex::new(vec![b"first".as_slice(), b"second".as_slice()]),
        }),
    );

    creds.save_tokens("access", Some("refresh")).unwrap();
    // Cached secret: still "first", reads fine.
    assert!(creds.read_token(TokenKind::Access).unwrap().is_some());

    creds.invalidate_secret();
    // Refetched secret no longer matches the sealed store.
    let err = creds.read_token(TokenKind::Access).unwrap_err();
    assert!(matches!(err, VaultError::AuthFailed));
}

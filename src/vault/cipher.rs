//! Sealed-file format for the vault: Argon2id KDF + ChaCha20-Poly1305 AEAD.
//!
//! The on-disk envelope is JSON with base64 fields. A key-commitment tag
//! (SHA-256 of the derived key) lets a wrong secret be reported as an
//! authentication failure rather than a corrupt store.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::VaultError;

pub(crate) const ENVELOPE_VERSION: u8 = 1;
const KDF: &str = "argon2id";

pub(crate) const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// On-disk representation of a sealed vault file.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SealedEnvelope {
    pub version: u8,
    pub kdf: String,
    pub salt: String,
    pub key_check: String,
    pub nonce: String,
    pub ciphertext: String,
    pub saved_at: DateTime<Utc>,
}

impl SealedEnvelope {
    pub fn to_json(&self) -> Result<String, VaultError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| VaultError::Corrupt(format!("envelope encode failed: {err}")))
    }

    pub fn from_json(raw: &str) -> Result<Self, VaultError> {
        let envelope: SealedEnvelope = serde_json::from_str(raw)
            .map_err(|err| VaultError::Corrupt(format!("envelope parse failed: {err}")))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::Corrupt(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        if envelope.kdf != KDF {
            return Err(VaultError::Corrupt(format!(
                "unsupported kdf {}",
                envelope.kdf
            )));
        }
        Ok(envelope)
    }
}

pub(crate) fn fresh_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the vault key from the device secret and a per-vault salt.
pub(crate) fn derive_key(secret: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN], VaultError> {
    let params = argon2::Params::new(19456, 2, 1, Some(KEY_LEN))
        .map_err(|err| VaultError::Corrupt(format!("invalid kdf parameters: {err}")))?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(secret, salt, &mut key)
        .map_err(|err| VaultError::Corrupt(format!("key derivation failed: {err}")))?;
    Ok(key)
}

pub(crate) fn key_commitment(key: &[u8; KEY_LEN]) -> String {
    let digest = Sha256::digest(key);
    STANDARD_NO_PAD.encode(digest)
}

/// Seal plaintext under the derived key into an on-disk envelope.
pub(crate) fn seal(
    key: &[u8; KEY_LEN],
    salt: &[u8; SALT_LEN],
    plaintext: &[u8],
) -> Result<SealedEnvelope, VaultError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|err| VaultError::Corrupt(format!("encryption failed: {err}")))?;

    Ok(SealedEnvelope {
        version: ENVELOPE_VERSION,
        kdf: KDF.to_string(),
        salt: STANDARD_NO_PAD.encode(salt),
        key_check: key_commitment(key),
        nonce: STANDARD_NO_PAD.encode(nonce),
        ciphertext: STANDARD_NO_PAD.encode(ciphertext),
        saved_at: Utc::now(),
    })
}

/// Open an envelope with the derived key.
///
/// A key-commitment mismatch is `AuthFailed`; anything else unreadable in
/// the envelope is `Corrupt`.
pub(crate) fn open_sealed(
    key: &[u8; KEY_LEN],
    envelope: &SealedEnvelope,
) -> Result<Vec<u8>, VaultError> {
    if envelope.key_check != key_commitment(key) {
        return Err(VaultError::AuthFailed);
    }
    let nonce = STANDARD_NO_PAD
        .decode(&envelope.nonce)
        .map_err(|err| VaultError::Corrupt(format!("invalid nonce encoding: {err}")))?;
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Corrupt("invalid nonce length".to_string()));
    }
    let ciphertext = STANDARD_NO_PAD
        .decode(&envelope.ciphertext)
        .map_err(|err| VaultError::Corrupt(format!("invalid ciphertext encoding: {err}")))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| VaultError::Corrupt("ciphertext authentication failed".to_string()))
}

pub(crate) fn decode_salt(encoded: &str) -> Result<[u8; SALT_LEN], VaultError> {
    let raw = STANDARD_NO_PAD
        .decode(encoded)
        .map_err(|err| VaultError::Corrupt(format!("invalid salt encoding: {err}")))?;
    let mut salt = [0u8; SALT_LEN];
    if raw.len() != SALT_LEN {
        return Err(VaultError::Corrupt("invalid salt length".to_string()));
    }
    salt.copy_from_slice(&raw);
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open_round_trip() {
        let salt = fresh_salt();
        let key = derive_key(b"device-secret", &salt).unwrap();
        let envelope = seal(&key, &salt, b"hello vault").unwrap();
        let plaintext = open_sealed(&key, &envelope).unwrap();
        assert_eq!(plaintext, b"hello vault");
    }

    #[test]
    fn wrong_key_is_auth_failed() {
        let salt = fresh_salt();
        let key = derive_key(b"right-secret", &salt).unwrap();
        let envelope = seal(&key, &salt, b"payload").unwrap();

        let wrong = derive_key(b"wrong-secret", &salt).unwrap();
        let err = open_sealed(&wrong, &envelope).unwrap_err();
        assert!(matches!(err, VaultError::AuthFailed));
    }

    #[test]
    fn tampered_ciphertext_is_corrupt() {
        let salt = fresh_salt();
        let key = derive_key(b"secret", &salt).unwrap();
        let mut envelope = seal(&key, &salt, b"payload").unwrap();
        envelope.ciphertext = STANDARD_NO_PAD.encode(b"not the real ciphertext");

        let err = open_sealed(&key, &envelope).unwrap_err();
        assert!(matches!(err, VaultError::Corrupt(_)));
    }

    #[test]
    fn unparseable_envelope_is_corrupt() {
        let err = SealedEnvelope::from_json("{ not json").unwrap_err();
        assert!(matches!(err, VaultError::Corrupt(_)));
    }

    #[test]
    fn future_envelope_version_is_corrupt() {
        let salt = fresh_salt();
        let key = derive_key(b"secret", &salt).unwrap();
        let mut envelope = seal(&key, &salt, b"payload").unwrap();
        envelope.version = 99;
        let raw = envelope.to_json().unwrap();
        let err = SealedEnvelope::from_json(&raw).unwrap_err();
        assert!(matches!(err, VaultError::Corrupt(_)));
    }
}

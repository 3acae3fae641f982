use thiserror::Error;

use crate::vault::VaultError;

/// Provider-level authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Access denied")]
    AccessDenied,
    #[error("Expired or invalid grant")]
    ExpiredOrInvalidGrant,
    #[error("Timed out waiting for authorization after {0}s")]
    Timeout(u64),
    #[error("No refresh token returned (offline_access scope missing?)")]
    MissingRefreshToken,
    #[error("No game license associated with this account")]
    NoEntitlement,
    #[error("Xbox Live sign-in refused (XErr {xerr}): {hint}")]
    Xbox { xerr: u64, hint: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}

impl AuthError {
    /// Whether this failure means the device-code session expired.
    ///
    /// The structured variant is authoritative; matching on the rendered
    /// text is a fallback for errors relayed as opaque strings.
    pub fn is_expiry(&self) -> bool {
        match self {
            Self::ExpiredOrInvalidGrant => true,
            other => text_marks_expiry(&other.to_string()),
        }
    }
}

/// Fallback markers for expiry detection in relayed error text.
///
/// "expired" also covers the provider's `expired_token` error code.
pub(crate) const EXPIRY_MARKERS: &[&str] = &["expired"];

pub(crate) fn text_marks_expiry(text: &str) -> bool {
    let lower = text.to_lowercase();
    EXPIRY_MARKERS.iter().any(|marker| lower.contains(marker))
}

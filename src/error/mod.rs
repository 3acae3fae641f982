//! Error types for Ember.

use thiserror::Error;

use crate::auth::error::AuthError;
use crate::launch::LaunchError;
use crate::vault::VaultError;

pub type Result<T> = std::result::Result<T, EmberError>;

/// Primary error type for all Ember operations.
#[derive(Error, Debug)]
pub enum EmberError {
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    VaultAccess,
    Network,
    Timeout,
    Validation,
    Configuration,
    Io,
}

/// The single recovery action offered for a terminal error.
///
/// An expired device-code session gets a one-click restart; everything
/// else gets reload-or-back. No error is retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Restart,
    ReloadOrBack,
}

impl EmberError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Vault(_) => ErrorCategory::VaultAccess,
            Self::Auth(AuthError::Timeout(_)) => ErrorCategory::Timeout,
            Self::Auth(AuthError::Network(_)) => ErrorCategory::Network,
            Self::Auth(AuthError::Vault(_)) => ErrorCategory::VaultAccess,
            Self::Auth(_) => ErrorCategory::Authentication,
            Self::Launch(_) => ErrorCategory::Validation,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// The recovery action to surface alongside this error.
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            Self::Auth(err) if err.is_expiry() => RecoveryAction::Restart,
            _ => RecoveryAction::ReloadOrBack,
        }
    }
}

//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthBackend, AuthError, AuthErrorKind, AuthPhase, DeviceCodeSession, FlowSnapshot, LinkOpener,
    Profile, SignInFlow,
};
pub use crate::config::EmberConfig;
pub use crate::credentials::{CredentialService, TokenKind};
pub use crate::error::{EmberError, RecoveryAction, Result};
pub use crate::launch::{
    JobOutcome, JobState, LaunchError, LaunchEvent, LaunchRequest, Launcher, ProgressBus,
};
pub use crate::vault::{SecretSource, Vault, VaultError};

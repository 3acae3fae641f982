//! Device-code sign-in: session types, provider backends, flow controller.

pub mod device_code;
pub mod error;
pub mod flow;
pub mod link;
pub mod providers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use device_code::{DeviceCodeSession, DevicePoll};
pub use error::AuthError;
pub use flow::{AuthErrorKind, AuthPhase, FlowError, FlowSnapshot, SignInFlow};
pub use link::{LinkOpener, NoopLinkOpener, SystemLinkOpener};

/// Resolved player profile, the final product of a sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub skin_url: Option<String>,
}

/// Identity-provider operations consumed by the flow controller.
///
/// Implemented by [`providers::microsoft::MicrosoftAuth`]; test suites
/// substitute scripted mocks.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Issue a new device/user code pair.
    async fn begin_device_code(&self) -> Result<DeviceCodeSession, AuthError>;

    /// Poll until authorized, expired, denied, or timed out.
    ///
    /// Owns the retry/backoff loop against the provider. On success the
    /// refresh credential has already been stored durably via the
    /// credential service.
    async fn poll_until_authorized(
        &self,
        device_code: &str,
        interval_secs: u64,
        timeout_secs: u64,
    ) -> Result<(), AuthError>;

    /// Exchange the stored refresh credential for a profile.
    async fn fetch_profile_from_stored_refresh(&self) -> Result<Profile, AuthError>;
}

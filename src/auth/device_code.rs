/// Device-code session issued by the identity provider.
///
/// `device_code` is the opaque polling handle and is never shown to the
/// user; `user_code` is what the user types at the verification URI.
///
/// # Example
/// ```
/// use ember::auth::DeviceCodeSession;
///
/// let session = DeviceCodeSession {
///     user_code: "ABC-123".to_string(),
///     device_code: "device-auth-id".to_string(),
///     verification_uri: "https://www.microsoft.com/link".to_string(),
///     expires_in_secs: 900,
///     interval_secs: 5,
///     message: String::new(),
/// };
/// assert!(session.interval_secs > 0);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceCodeSession {
    pub user_code: String,
    pub device_code: String,
    pub verification_uri: String,
    /// Absolute budget from issuance; only counts down.
    pub expires_in_secs: u64,
    /// Minimum spacing between poll attempts.
    pub interval_secs: u64,
    /// Provider-supplied display text for the verification step.
    pub message: String,
}

/// Outcome of a single poll attempt against the token endpoint.
#[derive(Debug, Clone)]
pub enum DevicePoll {
    Pending { interval_secs: u64 },
    SlowDown { interval_secs: u64 },
    /// Credentials were stored as a side effect; nothing to hand back.
    Authorized,
    AccessDenied,
    Expired,
}

//! Microsoft device-code sign-in and the Xbox profile-resolution chain.
//!
//! Tokens never leave this module except through the credential service;
//! the profile is the only thing handed back to callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::auth::device_code::{DeviceCodeSession, DevicePoll};
use crate::auth::error::AuthError;
use crate::auth::{AuthBackend, Profile};
use crate::credentials::{CredentialService, TokenKind};
use crate::vault::VaultError;

const DEFAULT_CLIENT_ID: &str = "e5a244a8-3f50-41fb-b4fb-5b58bf356f5e";
const DEFAULT_SCOPES: &str = "XboxLive.signin offline_access";
const DEFAULT_MARKET: &str = "en-US";

const DEFAULT_DEVICE_CODE_URL: &str =
    "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
const DEFAULT_TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const DEFAULT_XBOX_AUTH_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const DEFAULT_XSTS_AUTH_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const DEFAULT_GAME_LOGIN_URL: &str =
    "https://api.minecraftservices.com/authentication/login_with_xbox";
const DEFAULT_ENTITLEMENTS_URL: &str = "https://api.minecraftservices.com/entitlements/mcstore";
const DEFAULT_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";

const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Providers send intervals as low as 1s; space polls out regardless.
const MIN_POLL_INTERVAL_SECS: u64 = 3;

/// Microsoft OAuth helper with device-code flow and profile resolution.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use ember::auth::providers::microsoft::MicrosoftAuth;
/// use ember::credentials::CredentialService;
/// use ember::vault::{SecretSource, VaultError};
///
/// struct Fixed;
/// impl SecretSource for Fixed {
///     fn device_secret(&self) -> Result<Vec<u8>, VaultError> {
///         Ok(b"secret".to_vec())
///     }
/// }
///
/// let creds = Arc::new(CredentialService::new("/tmp/vault.hold", Box::new(Fixed)));
/// let auth = MicrosoftAuth::new(creds);
/// ```
pub struct MicrosoftAuth {
    client: reqwest::Client,
    client_id: String,
    scopes: String,
    market: String,
    device_code_url: String,
    token_url: String,
    xbox_auth_url: String,
    xsts_auth_url: String,
    game_login_url: String,
    entitlements_url: String,
    profile_url: String,
    credentials: Arc<CredentialService>,
}

impl MicrosoftAuth {
    pub fn new(credentials: Arc<CredentialService>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            market: DEFAULT_MARKET.to_string(),
            device_code_url: DEFAULT_DEVICE_CODE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            xbox_auth_url: DEFAULT_XBOX_AUTH_URL.to_string(),
            xsts_auth_url: DEFAULT_XSTS_AUTH_URL.to_string(),
            game_login_url: DEFAULT_GAME_LOGIN_URL.to_string(),
            entitlements_url: DEFAULT_ENTITLEMENTS_URL.to_string(),
            profile_url: DEFAULT_PROFILE_URL.to_string(),
            credentials,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    pub fn with_device_code_url(mut self, url: impl Into<String>) -> Self {
        self.device_code_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_xbox_auth_url(mut self, url: impl Into<String>) -> Self {
        self.xbox_auth_url = url.into();
        self
    }

    pub fn with_xsts_auth_url(mut self, url: impl Into<String>) -> Self {
        self.xsts_auth_url = url.into();
        self
    }

    pub fn with_game_login_url(mut self, url: impl Into<String>) -> Self {
        self.game_login_url = url.into();
        self
    }

    pub fn with_entitlements_url(mut self, url: impl Into<String>) -> Self {
        self.entitlements_url = url.into();
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = url.into();
        self
    }

    /// Request a new device/user code pair.
    pub async fn begin_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        let resp = self
            .client
            .post(&self.device_code_url)
            .query(&[("mkt", self.market.as_str())])
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "device code request failed: {status} – {body}"
            )));
        }
        let payload: DeviceCodeResponse = serde_json::from_str(&body)?;
        Ok(DeviceCodeSession {
            user_code: payload.user_code,
            device_code: payload.device_code,
            verification_uri: payload.verification_uri,
            expires_in_secs: payload.expires_in,
            interval_secs: payload.interval.max(MIN_POLL_INTERVAL_SECS),
            message: payload.message.unwrap_or_default(),
        })
    }

    /// Issue a single poll against the token endpoint.
    ///
    /// On success the tokens are stored durably as a side effect and only
    /// `Authorized` is returned.
    pub async fn poll_once(
        &self,
        device_code: &str,
        interval_secs: u64,
    ) -> Result<DevicePoll, AuthError> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", GRANT_TYPE_DEVICE_CODE),
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.is_success() {
            let payload: TokenResponse = serde_json::from_str(&body)?;
            let refresh = payload
                .refresh_token
                .ok_or(AuthError::MissingRefreshToken)?;
            self.credentials
                .save_tokens(&payload.access_token, Some(&refresh))?;
            debug!("device-code authorization complete, tokens stored");
            return Ok(DevicePoll::Authorized);
        }

        match poll_error_code(&body).as_deref() {
            Some("authorization_pending") => Ok(DevicePoll::Pending { interval_secs }),
            Some("slow_down") => Ok(DevicePoll::SlowDown {
                interval_secs: interval_secs + 2,
            }),
            Some("expired_token") => Ok(DevicePoll::Expired),
            Some("authorization_declined") | Some("access_denied") => Ok(DevicePoll::AccessDenied),
            _ => Err(AuthError::InvalidResponse(format!(
                "token exchange failed: {status} – {body}"
            ))),
        }
    }

    /// Poll until authorized, bounded by `timeout_secs` total.
    pub async fn poll_until_authorized(
        &self,
        device_code: &str,
        interval_secs: u64,
        timeout_secs: u64,
    ) -> Result<(), AuthError> {
        let started = Instant::now();
        let mut wait_secs = interval_secs;
        loop {
            if started.elapsed().as_secs() >= timeout_secs {
                return Err(AuthError::Timeout(timeout_secs));
            }
            match self.poll_once(device_code, interval_secs).await? {
                DevicePoll::Authorized => return Ok(()),
                DevicePoll::Pending { interval_secs } => wait_secs = interval_secs,
                DevicePoll::SlowDown { interval_secs } => {
                    debug!(interval_secs, "provider asked to slow down");
                    wait_secs = interval_secs;
                }
                DevicePoll::Expired => return Err(AuthError::ExpiredOrInvalidGrant),
                DevicePoll::AccessDenied => return Err(AuthError::AccessDenied),
            }
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }
    }

    /// Whether a refresh credential is stored.
    pub fn is_signed_in(&self) -> Result<bool, VaultError> {
        Ok(self.credentials.read_token(TokenKind::Refresh)?.is_some())
    }

    /// Drop stored credentials. Safe to call when already signed out.
    pub fn sign_out(&self) -> Result<(), VaultError> {
        self.credentials.clear_tokens()
    }

    /// Exchange the stored refresh credential for a player profile.
    ///
    /// Runs the full chain: refresh → Xbox Live → XSTS → game login →
    /// entitlement check → profile fetch.
    pub async fn fetch_profile_from_stored_refresh(&self) -> Result<Profile, AuthError> {
        let refresh = self
            .credentials
            .read_token(TokenKind::Refresh)?
            .ok_or(AuthError::NotSignedIn)?;

        let ms_access = self.refresh_access_token(&refresh).await?;
        debug!("refreshed provider access token");
        let (xbox_token, _) = self.xbox_user_auth(&ms_access).await?;
        let (xsts_token, user_hash) = self.xsts_authorize(&xbox_token).await?;
        let game_token = self.game_login(&user_hash, &xsts_token).await?;
        self.check_entitlement(&game_token).await?;
        let profile = self.fetch_profile(&game_token).await?;
        debug!(name = %profile.name, "profile resolved");
        Ok(profile)
    }

    async fn refresh_access_token(&self, refresh: &str) -> Result<String, AuthError> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            if poll_error_code(&body).as_deref() == Some("invalid_grant") {
                return Err(AuthError::ExpiredOrInvalidGrant);
            }
            return Err(AuthError::InvalidResponse(format!(
                "token refresh failed: {status} – {body}"
            )));
        }
        let payload: TokenResponse = serde_json::from_str(&body)?;
        // The provider may rotate the refresh token; keep the vault current.
        self.credentials
            .save_tokens(&payload.access_token, payload.refresh_token.as_deref())?;
        Ok(payload.access_token)
    }

    async fn xbox_user_auth(&self, ms_access: &str) -> Result<(String, String), AuthError> {
        let body = json!({
            "Properties": {
                "AuthMethod": "RPS",
                "SiteName": "user.auth.xboxlive.com",
                "RpsTicket": format!("d={ms_access}"),
            },
            "RelyingParty": "http://auth.xboxlive.com",
            "TokenType": "JWT",
        });
        let resp = self
            .client
            .post(&self.xbox_auth_url)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<XboxErrorBody>(&text) {
                let xerr = err.xerr.unwrap_or(0);
                return Err(AuthError::Xbox {
                    xerr,
                    hint: xbox_error_hint(xerr, err.message.as_deref()),
                });
            }
            return Err(AuthError::InvalidResponse(format!(
                "xbox auth failed: {status} – {text}"
            )));
        }
        let parsed: XboxAuthResponse = serde_json::from_str(&text)?;
        let user_hash = parsed.user_hash()?;
        Ok((parsed.token, user_hash))
    }

    async fn xsts_authorize(&self, xbox_token: &str) -> Result<(String, String), AuthError> {
        let body = json!({
            "Properties": {
                "SandboxId": "RETAIL",
                "UserTokens": [xbox_token],
            },
            "RelyingParty": "rp://api.minecraftservices.com/",
            "TokenType": "JWT",
        });
        let resp = self
            .client
            .post(&self.xsts_auth_url)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<XboxErrorBody>(&text) {
                let xerr = err.xerr.unwrap_or(0);
                return Err(AuthError::Xbox {
                    xerr,
                    hint: xbox_error_hint(xerr, err.message.as_deref()),
                });
            }
            return Err(AuthError::InvalidResponse(format!(
                "xsts auth failed: {status} – {text}"
            )));
        }
        let parsed: XboxAuthResponse = serde_json::from_str(&text)?;
        let user_hash = parsed.user_hash()?;
        Ok((parsed.token, user_hash))
    }

    async fn game_login(&self, user_hash: &str, xsts_token: &str) -> Result<String, AuthError> {
        let body = json!({
            "identityToken": format!("XBL3.0 x={user_hash};{xsts_token}"),
        });
        let resp = self
            .client
            .post(&self.game_login_url)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "game login failed: {status} – {text}"
            )));
        }
        let payload: GameLoginResponse = serde_json::from_str(&text)?;
        Ok(payload.access_token)
    }

    async fn check_entitlement(&self, game_token: &str) -> Result<(), AuthError> {
        let resp = self
            .client
            .get(&self.entitlements_url)
            .bearer_auth(game_token)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "entitlement check failed: {status} – {text}"
            )));
        }
        let payload: EntitlementsResponse = serde_json::from_str(&text)?;
        if payload.items.is_empty() {
            return Err(AuthError::NoEntitlement);
        }
        Ok(())
    }

    async fn fetch_profile(&self, game_token: &str) -> Result<Profile, AuthError> {
        let resp = self
            .client
            .get(&self.profile_url)
            .bearer_auth(game_token)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "profile fetch failed: {status} – {text}"
            )));
        }
        let payload: ProfileResponse = serde_json::from_str(&text)?;
        let skin_url = payload
            .skins
            .unwrap_or_default()
            .into_iter()
            .find(|skin| skin.state == "ACTIVE")
            .map(|skin| skin.url);
        Ok(Profile {
            id: payload.id,
            name: payload.name,
            skin_url,
        })
    }
}

#[async_trait]
impl AuthBackend for MicrosoftAuth {
    async fn begin_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        MicrosoftAuth::begin_device_code(self).await
    }

    async fn poll_until_authorized(
        &self,
        device_code: &str,
        interval_secs: u64,
        timeout_secs: u64,
    ) -> Result<(), AuthError> {
        MicrosoftAuth::poll_until_authorized(self, device_code, interval_secs, timeout_secs).await
    }

    async fn fetch_profile_from_stored_refresh(&self) -> Result<Profile, AuthError> {
        MicrosoftAuth::fetch_profile_from_stored_refresh(self).await
    }
}

/// Extract the provider's structured error code from a failure body.
///
/// JSON is authoritative; the substring scan only handles bodies that are
/// not valid JSON.
fn poll_error_code(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    for code in [
        "authorization_pending",
        "slow_down",
        "expired_token",
        "authorization_declined",
        "access_denied",
        "invalid_grant",
    ] {
        if body.contains(code) {
            return Some(code.to_string());
        }
    }
    None
}

fn xbox_error_hint(xerr: u64, message: Option<&str>) -> String {
    let hint = match xerr {
        2148916233 => "no Xbox profile on this account; create a gamertag first",
        2148916235 => "child account; parental consent required",
        2148916238 => "account suspended or banned",
        _ => "",
    };
    match (hint.is_empty(), message) {
        (false, _) => hint.to_string(),
        (true, Some(message)) if !message.is_empty() => message.to_string(),
        _ => format!("unrecognized xbox error {xerr}"),
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    user_code: String,
    device_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XboxAuthResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims")]
    display_claims: DisplayClaims,
}

impl XboxAuthResponse {
    fn user_hash(&self) -> Result<String, AuthError> {
        self.display_claims
            .xui
            .first()
            .map(|claim| claim.uhs.clone())
            .ok_or_else(|| AuthError::InvalidResponse("missing user hash claim".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct DisplayClaims {
    xui: Vec<UserHashClaim>,
}

#[derive(Debug, Deserialize)]
struct UserHashClaim {
    uhs: String,
}

#[derive(Debug, Deserialize)]
struct XboxErrorBody {
    #[serde(rename = "XErr")]
    xerr: Option<u64>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GameLoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EntitlementsResponse {
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    id: String,
    name: String,
    skins: Option<Vec<SkinEntry>>,
}

#[derive(Debug, Deserialize)]
struct SkinEntry {
    url: String,
    state: String,
}

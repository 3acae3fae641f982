//! Configuration system (layered: code > env > file > defaults).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::credentials::CredentialService;
use crate::error::EmberError;

const ENV_CLIENT_ID: &str = "EMBER_CLIENT_ID";
const ENV_MARKET: &str = "EMBER_MARKET";
const ENV_DATA_DIR: &str = "EMBER_DATA_DIR";

const VAULT_FILE: &str = "vault.hold";
const SECRET_FALLBACK_FILE: &str = "device_secret.b64";

#[cfg(feature = "keyring")]
const KEYCHAIN_SERVICE: &str = "dev.ember.launcher";
#[cfg(feature = "keyring")]
const KEYCHAIN_USER: &str = "vault_device_secret";

/// Layered configuration for Ember.
///
/// `client_id`/`market` of `None` mean "use the provider defaults".
///
/// # Example
/// ```no_run
/// use ember::config::EmberConfig;
///
/// let config = EmberConfig::from_env();
/// let creds = config.credential_service();
/// ```
#[derive(Debug, Clone)]
pub struct EmberConfig {
    pub client_id: Option<String>,
    pub market: Option<String>,
    pub data_dir: PathBuf,
}

impl Default for EmberConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            market: None,
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    client_id: Option<String>,
    market: Option<String>,
    data_dir: Option<PathBuf>,
}

impl EmberConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables, reading `.env` when present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Ok(client_id) = std::env::var(ENV_CLIENT_ID) {
            config.client_id = Some(client_id);
        }
        if let Ok(market) = std::env::var(ENV_MARKET) {
            config.market = Some(market);
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }

    /// Load a TOML config file on top of the defaults.
    pub fn load_file(path: &Path) -> Result<Self, EmberError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&raw)
            .map_err(|err| EmberError::Configuration(format!("{}: {err}", path.display())))?;
        Ok(Self {
            client_id: file.client_id,
            market: file.market,
            data_dir: file.data_dir.unwrap_or_else(default_data_dir),
        })
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn vault_file(&self) -> PathBuf {
        self.data_dir.join(VAULT_FILE)
    }

    pub fn secret_fallback_file(&self) -> PathBuf {
        self.data_dir.join(SECRET_FALLBACK_FILE)
    }

    /// Build the credential service for this configuration.
    ///
    /// Uses the OS keychain for the device secret when built with the
    /// `keyring` feature, with the local file as fallback either way.
    pub fn credential_service(&self) -> CredentialService {
        #[cfg(feature = "keyring")]
        let source = Box::new(crate::vault::KeyringSecretSource::new(
            KEYCHAIN_SERVICE,
            KEYCHAIN_USER,
            self.secret_fallback_file(),
        ));
        #[cfg(not(feature = "keyring"))]
        let source = Box::new(crate::vault::FileSecretSource::new(
            self.secret_fallback_file(),
        ));
        CredentialService::new(self.vault_file(), source)
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "ember", "ember")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".ember"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_points_at_project_data_dir() {
        let config = EmberConfig::new();
        assert!(config.client_id.is_none());
        assert!(config.vault_file().ends_with("vault.hold"));
    }

    #[test]
    fn load_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ember.toml");
        std::fs::write(
            &path,
            "client_id = \"my-client\"\nmarket = \"fr-FR\"\ndata_dir = \"/tmp/ember-data\"\n",
        )
        .unwrap();

        let config = EmberConfig::load_file(&path).unwrap();
        assert_eq!(config.client_id.as_deref(), Some("my-client"));
        assert_eq!(config.market.as_deref(), Some("fr-FR"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ember-data"));
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ember.toml");
        std::fs::write(&path, "client_id = [not toml").unwrap();

        let err = EmberConfig::load_file(&path).unwrap_err();
        assert!(matches!(err, EmberError::Configuration(_)));
    }
}

//! Application configuration management.
//!
//! Configuration is stored at `~/.config/stitchtracker/config.json`. Every
//! field has a default, so a missing file is a valid configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::api::{ReqwestTransport, Transport};
use crate::auth::{
    CredentialStore, FileStore, KeyValueStore, KeyringStore, SessionManager,
    DEFAULT_RENEWAL_SKEW_SECS,
};
use crate::shelf::SHELF_FILE;

/// Application name used for config/data directory paths
const APP_NAME: &str = "stitchtracker";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Token file name in the data directory
const TOKEN_FILE: &str = "tokens.json";

/// Environment variable overriding `api_base`
pub const API_BASE_ENV: &str = "STITCH_API_BASE";

const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// Where the token pair is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub token_storage: TokenStorage,
    pub renewal_skew_secs: u64,
    pub request_timeout_secs: u64,
    pub last_username: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_storage: TokenStorage::default(),
            renewal_skew_secs: DEFAULT_RENEWAL_SKEW_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_username: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `STITCH_API_BASE` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                self.api_base = base.trim().to_string();
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Where the stash shelf layout is kept.
    pub fn shelf_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(SHELF_FILE))
    }

    pub fn renewal_skew(&self) -> Duration {
        Duration::from_secs(self.renewal_skew_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured token persistence backend.
    pub fn token_backend(&self) -> Result<Box<dyn KeyValueStore>> {
        Ok(match self.token_storage {
            TokenStorage::File => Box::new(FileStore::new(self.data_dir()?.join(TOKEN_FILE))),
            TokenStorage::Keyring => Box::new(KeyringStore::new()),
        })
    }

    /// Build a session manager wired to the real network and token store.
    /// Must be called from within a Tokio runtime.
    pub fn build_session(&self) -> Result<SessionManager> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(self.request_timeout())?);
        let store = CredentialStore::new(self.token_backend()?);
        Ok(SessionManager::new(
            self.api_base.clone(),
            transport,
            store,
            self.renewal_skew(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_base, "http://localhost:8000/api");
        assert_eq!(config.renewal_skew(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_base": "https://stitch.example/api", "token_storage": "keyring"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_base, "https://stitch.example/api");
        assert_eq!(config.token_storage, TokenStorage::Keyring);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            last_username: Some("alice".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}

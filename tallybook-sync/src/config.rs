//! Sync engine configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tallybook_crypto::KdfParams;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "TALLYBOOK_";

/// Configuration for the sync coordinator and its gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the invoicing API (e.g., "https://api.tallybook.app").
    pub api_base_url: String,

    /// Path of the GraphQL endpoint under `api_base_url`.
    pub graphql_path: String,

    /// Per-request timeout for remote calls, in seconds.
    pub request_timeout_secs: u64,

    /// Location of the local SQLite database.
    pub database_path: PathBuf,

    /// Cost parameters for deriving the vault key.
    pub kdf: KdfParams,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.tallybook.app".to_string(),
            graphql_path: "/graphql".to_string(),
            request_timeout_secs: 30,
            database_path: PathBuf::from("tallybook.db"),
            kdf: KdfParams::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> SyncResult<Self> {
        toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Reads a TOML file, then applies `TALLYBOOK_*` environment overrides.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which is handed full variable names
    /// such as `TALLYBOOK_API_BASE_URL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> SyncResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(url) = var("API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(path) = var("GRAPHQL_PATH") {
            self.graphql_path = path;
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.parse().map_err(|_| {
                SyncError::Config(format!("{ENV_PREFIX}REQUEST_TIMEOUT_SECS: not a number: {secs}"))
            })?;
        }
        if let Some(db) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(db);
        }
        Ok(())
    }

    /// Full URL requests are posted to.
    pub fn graphql_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.graphql_path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Creates a config for tests against a local mock server.
    pub fn for_test(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout_secs: 5,
            database_path: PathBuf::from(":memory:"),
            kdf: KdfParams::insecure_fast(),
            ..Self::default()
        }
    }
}

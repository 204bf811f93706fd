//! Agent configuration management.
//!
//! This module handles loading and saving the agent configuration: the
//! application origin, where the manifest lives, how stores are named and
//! where on disk the caches and the location ledger are kept.
//!
//! Configuration is stored at `~/.config/simcache/config.json`. The
//! `SIMCACHE_ORIGIN` and `SIMCACHE_DATA_DIR` environment variables override
//! the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AgentError;
use crate::ledger::LedgerMode;
use crate::network::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Application name used for config/data directory paths
const APP_NAME: &str = "simcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Subdirectory of the data dir holding the blob stores
const STORES_DIR: &str = "stores";

/// Ledger file name, after the selection database it replaces
const LEDGER_FILE: &str = "simulador-ubicaciones.json";

pub const ENV_ORIGIN: &str = "SIMCACHE_ORIGIN";
pub const ENV_DATA_DIR: &str = "SIMCACHE_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL that manifest paths are resolved against.
    pub origin: String,
    /// Location of the manifest document, relative to `origin`.
    pub manifest_path: String,
    /// Store that holds the last good manifest payload.
    pub manifest_store_name: String,
    /// Path segment whose trailing variants all share one cache entry.
    pub canonical_route: String,
    pub ledger_mode: LedgerMode,
    /// Retry startup in the background when a request arrives after a failed one.
    pub reinit_on_cold_fetch: bool,
    pub request_timeout_secs: u64,
    pub data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080/".to_string(),
            manifest_path: "/cache.json".to_string(),
            manifest_store_name: "simulador-cache".to_string(),
            canonical_route: "sufragio.html".to_string(),
            ledger_mode: LedgerMode::default(),
            reinit_on_cold_fetch: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            data_dir: None,
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Load the config file (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Ok(Self::load_from(&path)?.with_env_overrides())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(origin) = std::env::var(ENV_ORIGIN) {
            self.origin = origin;
        }
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn stores_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(STORES_DIR))
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(LEDGER_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn origin_url(&self) -> Result<Url, AgentError> {
        Url::parse(&self.origin).map_err(|e| AgentError::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })
    }

    pub fn manifest_url(&self) -> Result<Url, AgentError> {
        let origin = self.origin_url()?;
        crate::utils::resolve(&origin, &self.manifest_path).map_err(|e| AgentError::InvalidUrl {
            url: self.manifest_path.clone(),
            reason: e.to_string(),
        })
    }
}

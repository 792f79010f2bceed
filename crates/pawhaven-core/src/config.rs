//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, session timing, the storage backend and the last used email.
//!
//! Configuration is stored at `~/.config/pawhaven/config.json`. A few fields
//! can be overridden from the environment (`PAWHAVEN_API_URL`,
//! `PAWHAVEN_AUTO_RENEW`, `PAWHAVEN_STORAGE`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::session::{
    FileBackend, KeyringBackend, MemoryBackend, MonitorConfig, SessionStore,
};

/// Application name used for config/data directory paths
const APP_NAME: &str = "pawhaven";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_API_URL: &str = "http://localhost:3333/api/v1";

const ENV_API_URL: &str = "PAWHAVEN_API_URL";
const ENV_AUTO_RENEW: &str = "PAWHAVEN_AUTO_RENEW";
const ENV_STORAGE: &str = "PAWHAVEN_STORAGE";

/// Where the session is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => anyhow::bail!("Unknown storage backend '{}' (file, keyring, memory)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub validity_window_secs: u64,
    pub warning_threshold_secs: u64,
    pub tick_interval_ms: u64,
    pub auto_renew: bool,
    pub login_path: String,
    pub storage: StorageKind,
    pub last_email: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            validity_window_secs: 3600,
            warning_threshold_secs: 300,
            tick_interval_ms: 1000,
            auto_renew: false,
            login_path: crate::session::guard::DEFAULT_LOGIN_PATH.to_string(),
            storage: StorageKind::File,
            last_email: None,
        }
    }
}

impl ClientConfig {
    /// Load from disk (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and log files.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::cache_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(base.join(APP_NAME))
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(flag) = var(ENV_AUTO_RENEW) {
            self.auto_renew = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(kind) = var(ENV_STORAGE) {
            self.storage = kind
                .parse()
                .with_context(|| format!("Invalid {}", ENV_STORAGE))?;
        }
        Ok(())
    }

    pub fn validity_window(&self) -> Duration {
        Duration::seconds(self.validity_window_secs as i64)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick_interval: StdDuration::from_millis(self.tick_interval_ms.max(1)),
            warning_threshold: Duration::seconds(self.warning_threshold_secs as i64),
            auto_renew: self.auto_renew,
        }
    }

    /// Open the session store on the configured backend.
    pub fn open_store(&self) -> Result<SessionStore> {
        let store = match self.storage {
            StorageKind::File => {
                let dir = self.data_dir()?;
                SessionStore::new(FileBackend::in_dir(&dir))
            }
            StorageKind::Keyring => SessionStore::new(KeyringBackend::new()),
            StorageKind::Memory => SessionStore::new(MemoryBackend::new()),
        };
        Ok(store)
    }
}

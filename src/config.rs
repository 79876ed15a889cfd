use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{slog_debug, Error, Result};

/// Connection settings for one cloud endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Endpoint {
    pub provider: Option<String>,
    pub region: Option<String>,
    pub auth_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: Endpoint,
    #[serde(default)]
    pub destination: Endpoint,
    /// Backend used by volume copy actions.
    pub copy_backend: Option<String>,
    pub plan_dir: Option<String>,
}

impl Config {
    pub fn skylift_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".skylift"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::skylift_dir()?.join("skylift.toml"))
    }

    pub fn plans_dir() -> Result<PathBuf> {
        let config = Self::load()?;
        match config.plan_dir {
            Some(dir) => Ok(expand_tilde(&dir)),
            None => Ok(Self::skylift_dir()?.join("plans")),
        }
    }

    pub fn effective_copy_backend(&self) -> &str {
        self.copy_backend.as_deref().unwrap_or("rsync")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        slog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            slog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        slog_debug!(
            "Config loaded: source={:?}, destination={:?}, copy_backend={:?}",
            config.source.provider,
            config.destination.provider,
            config.copy_backend
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let skylift_dir = Self::skylift_dir()?;
        slog_debug!("Config::save skylift_dir={}", skylift_dir.display());
        if !skylift_dir.exists() {
            slog_debug!("Creating skylift directory");
            fs::create_dir_all(&skylift_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        slog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let skylift_dir = Self::skylift_dir()?;
        let plans_dir = Self::plans_dir()?;
        slog_debug!(
            "Config::ensure_dirs skylift={} plans={}",
            skylift_dir.display(),
            plans_dir.display()
        );
        if !skylift_dir.exists() {
            slog_debug!("Creating skylift directory: {}", skylift_dir.display());
            fs::create_dir_all(&skylift_dir)?;
        }
        if !plans_dir.exists() {
            slog_debug!("Creating plans directory: {}", plans_dir.display());
            fs::create_dir_all(&plans_dir)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

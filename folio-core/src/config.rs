use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::history::EditHistory;

const DEFAULT_AUTOSAVE_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_title: String,
    pub autosave: AutosaveConfig,
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_title: "Untitled".to_string(),
            autosave: AutosaveConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_AUTOSAVE_SECS,
        }
    }
}

impl AutosaveConfig {
    pub fn interval(&self) -> Duration {
        // Never shorter than one second.
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: Option<usize>,
}

impl HistoryConfig {
    pub fn build(&self) -> EditHistory {
        match self.limit {
            Some(limit) => EditHistory::with_limit(limit),
            None => EditHistory::new(),
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("failed to decode config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("net", "folio", "folio")
            .ok_or_else(|| anyhow!("unable to resolve platform data directories"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }
}

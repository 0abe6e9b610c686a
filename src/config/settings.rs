//! Shell configuration (filesystem locations)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::paths;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Private data directory holding bin/, conf/ and log/
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_prop_file")]
    pub prop_file: PathBuf,

    /// Preferences file; relative paths resolve against `base_dir`
    #[serde(default = "default_prefs_file")]
    pub prefs_file: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(paths::BASE_DIR)
}

fn default_prop_file() -> PathBuf {
    PathBuf::from(paths::PROP_FILE)
}

fn default_prefs_file() -> PathBuf {
    PathBuf::from(paths::PREFS_FILE)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            prop_file: default_prop_file(),
            prefs_file: default_prefs_file(),
        }
    }
}

impl AppConfig {
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON from {:?}", path))?;

        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Preferences file with relative paths resolved against the base directory
    pub fn resolved_prefs_file(&self) -> PathBuf {
        if self.prefs_file.is_absolute() {
            self.prefs_file.clone()
        } else {
            self.base_dir.join(&self.prefs_file)
        }
    }
}

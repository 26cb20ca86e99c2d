//! Device configuration: where the target appliance lives and how to
//! authenticate against it.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection settings for a target appliance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Request timeout for appliance calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

/// Errors raised while locating or decoding the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("No device configuration found (looked in {0:?})")]
    NotFound(Vec<PathBuf>),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl DeviceConfig {
    /// Candidate config locations, highest priority first: the per-user
    /// config directory, then the working directory.
    pub fn locations() -> Vec<PathBuf> {
        let mut locations = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join("softimg").join("device.json"));
        }
        locations.push(PathBuf::from("device.json"));
        locations
    }

    /// Load the configuration, from `explicit` when given, otherwise
    /// from the first candidate location that exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let locations = Self::locations();
        for path in &locations {
            if path.exists() {
                return Self::load_from(path);
            }
        }
        Err(ConfigError::NotFound(locations))
    }

    /// Load the configuration from one specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("loading device configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration to a file, creating parent directories as
    /// needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json)?;
        Ok(())
    }
}

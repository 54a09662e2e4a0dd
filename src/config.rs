//! JSON configuration file
//!
//! Missing fields fall back to their defaults, so an empty `{}` is a valid
//! configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_OPTIMIZE_DELAY_MS, DEFAULT_STREAMER_EXECUTABLES};
use crate::optimizer::{OptimizerSettings, PerformancePreference};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executables kept on the streamer cores in streamer mode
    pub streamer_specific_executables: Vec<String>,
    /// Logical cores reserved for streaming software; streamer mode does
    /// nothing until this is set
    pub streamer_affinity_limit_cores: Option<Vec<u32>>,
    pub optimize_delay_ms: u64,
    pub verbose_errors: bool,
    pub performance_preference: PerformancePreference,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            streamer_specific_executables: DEFAULT_STREAMER_EXECUTABLES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            streamer_affinity_limit_cores: None,
            optimize_delay_ms: DEFAULT_OPTIMIZE_DELAY_MS,
            verbose_errors: false,
            performance_preference: PerformancePreference::default(),
        }
    }
}

impl Config {
    /// Loads `path`, writing a default file first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            preference: self.performance_preference,
            streamer_executables: self.streamer_specific_executables.clone(),
            streamer_cores: self.streamer_affinity_limit_cores.clone(),
            verbose_errors: self.verbose_errors,
        }
    }
}

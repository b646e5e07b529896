//! Configuration Module
//!
//! Optional TOML configuration for the CLIs: where the trust anchor folder
//! and the credential schema live, and the default credential validity.
//! Paths are always handed to the schema loader and trust store explicitly;
//! nothing in the toolkit changes the working directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credential::builder::DEFAULT_VALIDITY_DAYS;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Trust anchor folder (OpenSSL subject-hash layout)
    pub ca_dir: PathBuf,

    /// Bundled credential schema
    pub schema_path: PathBuf,

    /// Credential validity in whole days when `-d` is not given
    pub default_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ca_dir: PathBuf::from("resources/ca"),
            schema_path: PathBuf::from("resources/credential.xsd"),
            default_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ca_dir.is_dir() {
            return Err(ConfigError::InvalidConfig(format!(
                "CA folder not found: {}",
                self.ca_dir.display()
            )));
        }
        if !self.schema_path.is_file() {
            return Err(ConfigError::InvalidConfig(format!(
                "credential schema not found: {}",
                self.schema_path.display()
            )));
        }
        if self.default_days == 0 {
            return Err(ConfigError::InvalidConfig(
                "default_days cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

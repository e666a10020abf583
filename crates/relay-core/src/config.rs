use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ACTION_MARKER: &str = "ACTION:";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Loads `path` when it exists, falling back to defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.marker.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "stream.marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    /// Token that introduces a trailing action block.
    pub marker: String,
    /// Accept `ACTION: [{...}, ...]` in addition to a single object.
    pub allow_array_actions: bool,
    /// Recover `type`/`reason` by pattern when the block is balanced but not valid JSON.
    pub lenient_fallback: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_ACTION_MARKER.to_string(),
            allow_array_actions: true,
            lenient_fallback: true,
        }
    }
}

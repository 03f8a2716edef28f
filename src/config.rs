use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::runtime::VmConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings read from a TOML file. Every key is optional.
///
/// ```toml
/// [vm]
/// stack_size = 4096
/// max_steps = 1000000
///
/// [repl]
/// prompt = "monkey> "
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vm: VmConfig,
    pub repl: ReplConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    pub prompt: String,
    /// Line history file. Empty disables history.
    pub history_file: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            prompt: ">> ".to_string(),
            history_file: ".monkey_history".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&text, &display)
    }
}

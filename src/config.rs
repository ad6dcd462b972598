//! Front-end configuration.
//!
//! Loaded from a JSON file; every field is optional:
//!
//! ```json
//! { "indirect_addressing": true, "max_cycles": 50000, "speed_ms": 100 }
//! ```

use crate::console::DEFAULT_MAX_CYCLES;
use crate::cpu::EngineConfig;
use serde::{Serialize, Deserialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Fastest run cadence a front end may use.
pub const MIN_SPEED_MS: u64 = 10;

/// Default run cadence.
pub const DEFAULT_SPEED_MS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Honor the indirect bit of memory-reference words.
    pub indirect_addressing: bool,
    /// Bound on microcycles for batch runs.
    pub max_cycles: u64,
    /// Delay between microcycles in interactive runs.
    pub speed_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indirect_addressing: false,
            max_cycles: DEFAULT_MAX_CYCLES,
            speed_ms: DEFAULT_SPEED_MS,
        }
    }
}

impl Config {
    /// Read a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Engine options carried by this config.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig { indirect_addressing: self.indirect_addressing }
    }

    /// Run cadence, never faster than [`MIN_SPEED_MS`].
    pub fn speed(&self) -> Duration {
        Duration::from_millis(self.speed_ms.max(MIN_SPEED_MS))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config: {0}")]
    Parse(String),
}

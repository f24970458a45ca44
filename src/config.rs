//! Engine Configuration
//!
//! Pool size, workload scaling and channel sizing, loadable from TOML.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineResult;

/// Configuration for the task engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker thread count (0 is treated as 1)
    pub pool_size: usize,
    /// Family A list length per unit of input
    pub scale_a: i64,
    /// Family B list length per unit of input
    pub scale_b: i64,
    /// Capacity of the task event broadcast channel
    pub event_capacity: usize,
    /// Number of finished tasks kept for introspection
    pub max_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            scale_a: 10_000,
            scale_b: 1_000,
            event_capacity: 256,
            max_history: 100,
        }
    }
}

impl EngineConfig {
    /// Set the worker count
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the workload scale factors for families A and B
    pub fn with_scales(mut self, scale_a: i64, scale_b: i64) -> Self {
        self.scale_a = scale_a;
        self.scale_b = scale_b;
        self
    }

    /// Set the history limit
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> EngineResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Default config file location, `<config_dir>/task-families/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("task-families").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load_or_default() -> EngineResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml("pool_size = 4\nscale_b = 10\n").unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.scale_b, 10);
        assert_eq!(config.scale_a, 10_000);
        assert_eq!(config.max_history, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool_size = 3").unwrap();
        writeln!(file, "event_capacity = 16").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_invalid_toml() {
        let err = EngineConfig::from_toml("pool_size = \"many\"").unwrap_err();
        assert!(err.to_string().starts_with("Invalid configuration"));
    }
}

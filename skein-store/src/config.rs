use serde::{Deserialize, Serialize};
use std::path::Path;

use skein_heap::{BoundedHeap, SharedHeap, SystemHeap};
use skein_types::constants::{INT_MAP_MIN_SLOTS, NODE_MAP_START_SLOTS, YARN_DEFAULT_CAPACITY};
use skein_yarn::Growth;

use crate::error::StoreError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub yarn: YarnConfig,
    #[serde(default)]
    pub heap: HeapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Slots the token registry is created with.
    #[serde(default = "default_start_slots")]
    pub start_slots: usize,
}

fn default_start_slots() -> usize {
    NODE_MAP_START_SLOTS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            start_slots: default_start_slots(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YarnConfig {
    #[serde(default = "default_yarn_capacity")]
    pub initial_capacity: usize,
    /// Buffer growth policy: "double" or "exact".
    #[serde(default)]
    pub growth: Growth,
}

fn default_yarn_capacity() -> usize {
    YARN_DEFAULT_CAPACITY
}

impl Default for YarnConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_yarn_capacity(),
            growth: Growth::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Byte budget for the store's heap. Unbounded when unset.
    #[serde(default)]
    pub limit_bytes: Option<usize>,
}

impl HeapConfig {
    /// Build the heap this configuration describes.
    pub fn build(&self) -> SharedHeap {
        match self.limit_bytes {
            Some(limit) => BoundedHeap::shared(limit),
            None => SystemHeap::shared(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| StoreError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: StoreConfig = toml::from_str(&contents).map_err(|e| StoreError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), StoreError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = StoreConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| StoreError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join("skein.toml");
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }

    /// Reject values the store cannot be built from.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.registry.start_slots < INT_MAP_MIN_SLOTS {
            return Err(StoreError::ConfigError {
                reason: format!(
                    "registry.start_slots must be at least {}, got {}",
                    INT_MAP_MIN_SLOTS, self.registry.start_slots
                ),
            });
        }
        if self.logging.level.trim().is_empty() {
            return Err(StoreError::ConfigError {
                reason: "logging.level must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_heap::Heap;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.registry.start_slots, 512);
        assert_eq!(config.yarn.initial_capacity, 64);
        assert_eq!(config.yarn.growth, Growth::Double);
        assert_eq!(config.heap.limit_bytes, None);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = StoreConfig::default();
        config.yarn.growth = Growth::Exact;
        config.heap.limit_bytes = Some(1 << 20);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: StoreConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.yarn.growth, Growth::Exact);
        assert_eq!(deserialized.heap.limit_bytes, Some(1 << 20));
        assert_eq!(deserialized.registry.start_slots, config.registry.start_slots);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: StoreConfig = toml::from_str("[yarn]\ngrowth = \"exact\"\n").unwrap();
        assert_eq!(config.yarn.growth, Growth::Exact);
        assert_eq!(config.yarn.initial_capacity, 64);
        assert_eq!(config.registry.start_slots, 512);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_init_creates_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        StoreConfig::init(dir).unwrap();

        let config_path = tmp.path().join("skein.toml");
        assert!(config_path.exists());

        let contents = std::fs::read_to_string(config_path).unwrap();
        let _config: StoreConfig = toml::from_str(&contents).unwrap();
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = StoreConfig::load("/nonexistent/path/skein.toml");
        assert!(matches!(result, Err(StoreError::ConfigError { .. })));
    }

    #[test]
    fn test_load_valid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        StoreConfig::init(dir).unwrap();

        let config_path = tmp.path().join("skein.toml");
        let config = StoreConfig::load(config_path.to_str().unwrap()).unwrap();
        assert_eq!(config.registry.start_slots, 512);
    }

    #[test]
    fn test_load_rejects_tiny_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("skein.toml");
        std::fs::write(&path, "[registry]\nstart_slots = 1\n").unwrap();
        let err = StoreConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("start_slots"));
    }

    #[test]
    fn test_load_rejects_unknown_growth() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("skein.toml");
        std::fs::write(&path, "[yarn]\ngrowth = \"triple\"\n").unwrap();
        assert!(StoreConfig::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_heap_config_builds_bounded_heap() {
        let heap = HeapConfig {
            limit_bytes: Some(16),
        }
        .build();
        assert!(heap.grant(16).is_ok());
        assert!(heap.grant(1).is_err());
        heap.release(16);
    }
}

//! Material atlas configuration

use crate::constants::{cache, glob};
use crate::error::{AtlasResult, MaterialAtlasError};
use serde::Deserialize;
use std::path::Path;

/// Settings for building and uploading the material atlas
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaterialAtlasConfig {
    /// Create a normal+depth texture next to each material params page
    pub enable_normal_depth: bool,
    /// Version mixed into every cache key; bump to invalidate old bakes
    pub cache_schema_version: u32,
    /// Tile workers, 0 for one per logical CPU
    pub worker_threads: usize,
    pub max_pattern_length: usize,
}

impl Default for MaterialAtlasConfig {
    fn default() -> Self {
        Self {
            enable_normal_depth: false,
            cache_schema_version: cache::SCHEMA_VERSION,
            worker_threads: 0,
            max_pattern_length: glob::MAX_PATTERN_LENGTH,
        }
    }
}

impl MaterialAtlasConfig {
    pub fn from_toml_str(text: &str) -> AtlasResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> AtlasResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MaterialAtlasError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        log::info!("[MaterialAtlasConfig] Loaded {}", path.display());
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> AtlasResult<()> {
        if self.cache_schema_version == 0 {
            return Err(MaterialAtlasError::InvalidConfig {
                field: "cache_schema_version".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.max_pattern_length == 0 {
            return Err(MaterialAtlasError::InvalidConfig {
                field: "max_pattern_length".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Worker count with 0 resolved to the number of logical CPUs
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_threads
        }
    }
}

//! Configuration for data stream copies.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! [copy]
//! min_buffer_size = 8192
//! max_buffer_size = 262144
//! ```

use crate::error::{DataStreamError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest copy buffer (8KB)
pub const MIN_BUFFER_SIZE: usize = 8192;

/// Largest copy buffer (256KB)
pub const MAX_BUFFER_SIZE: usize = MIN_BUFFER_SIZE * 32;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStreamConfig {
    pub copy: CopyConfig,
}

/// Buffer bounds for the adaptive copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Lower bound for the copy buffer
    pub min_buffer_size: usize,
    /// Upper bound for the copy buffer
    pub max_buffer_size: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            min_buffer_size: MIN_BUFFER_SIZE,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }
}

impl CopyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_buffer_size == 0 {
            return Err(DataStreamError::Config(
                "copy.min_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.min_buffer_size > self.max_buffer_size {
            return Err(DataStreamError::Config(format!(
                "copy.min_buffer_size ({}) exceeds copy.max_buffer_size ({})",
                self.min_buffer_size, self.max_buffer_size
            )));
        }
        Ok(())
    }
}

impl DataStreamConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| DataStreamError::Config(e.to_string()))?;
        config.copy.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

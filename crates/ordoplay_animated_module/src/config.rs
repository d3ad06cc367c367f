// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime settings for the animated module.

use crate::scheduler::CallbackCategory;
use ordoplay_animated_driver::DEFAULT_FRAME_DURATION_MS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current settings format version
pub const ANIMATED_CONFIG_VERSION: u32 = 1;

/// Settings errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON for these settings
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },
}

/// Animated module settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedConfig {
    /// Settings format version
    pub version: u32,
    /// Sampling interval of frame-based drivers
    pub frame_duration_ms: f64,
    /// Log every queued and executed entry point
    pub log_operations: bool,
    /// Scheduler category the module registers its tick in
    pub callback_category: CallbackCategory,
}

impl Default for AnimatedConfig {
    fn default() -> Self {
        Self {
            version: ANIMATED_CONFIG_VERSION,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            log_operations: false,
            callback_category: CallbackCategory::NativeAnimatedModule,
        }
    }
}

impl AnimatedConfig {
    /// Parse settings from RON text
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        let config: AnimatedConfig = ron::from_str(content)?;
        if config.version > ANIMATED_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: ANIMATED_CONFIG_VERSION,
            });
        }
        Ok(config)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

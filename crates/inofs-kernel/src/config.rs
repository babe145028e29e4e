//! Configuration for the in-memory filesystem.
//!
//! Loaded from TOML; every key is optional.
//!
//! ```toml
//! attr_timeout_secs = 60.0
//! entry_timeout_secs = 60.0
//! root_mode = 0o777
//! generation = "shared"   # or "per_inode"
//! block_size = 4096
//! name_max = 255
//! max_file_size = 4294967296
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How generation numbers are assigned to created inodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPolicy {
    /// One nonzero value, seeded from the clock, shared by every inode.
    #[default]
    Shared,
    /// A fresh, strictly increasing value per created inode.
    PerInode,
}

/// In-memory filesystem settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemFsConfig {
    pub attr_timeout_secs: f64,
    pub entry_timeout_secs: f64,
    /// Permission bits of the root directory.
    pub root_mode: u32,
    pub generation: GenerationPolicy,
    /// Block size reported by `statfs`.
    pub block_size: u64,
    /// Longest accepted name, in bytes.
    pub name_max: u64,
    /// Largest size a file may grow to, in bytes.
    pub max_file_size: u64,
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            attr_timeout_secs: 60.0,
            entry_timeout_secs: 60.0,
            root_mode: 0o777,
            generation: GenerationPolicy::Shared,
            block_size: 4096,
            name_max: 255,
            max_file_size: 1 << 32,
        }
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl MemFsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check every field. `from_toml_str` and `MemFs::with_config` both
    /// call this.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, secs) in [
            ("attr_timeout_secs", self.attr_timeout_secs),
            ("entry_timeout_secs", self.entry_timeout_secs),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{key} must be a non-negative number of seconds a Duration can hold, got {secs}"
                )));
            }
        }
        if self.root_mode & !0o7777 != 0 {
            return Err(ConfigError::ValidationFailed(format!(
                "root_mode {:#o} has bits outside 0o7777",
                self.root_mode
            )));
        }
        if self.block_size == 0 || self.name_max == 0 {
            return Err(ConfigError::ValidationFailed(
                "block_size and name_max must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Zero if `attr_timeout_secs` is out of range.
    pub fn attr_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.attr_timeout_secs).unwrap_or_default()
    }

    /// Zero if `entry_timeout_secs` is out of range.
    pub fn entry_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.entry_timeout_secs).unwrap_or_default()
    }
}

//! # Arena Configuration
//!
//! Loaded once at startup, usually from a TOML table:
//!
//! ```toml
//! base_alignment = 16
//! max_allocations = 4096
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::{MAX_SHIFT, MIN_ALIGNMENT};

/// Default alignment of the arena's payload head.
pub const DEFAULT_BASE_ALIGNMENT: u32 = MIN_ALIGNMENT;

/// Fewest node-table entries an arena is created with.
pub const MIN_MAX_ALLOCATIONS: u32 = 16;

/// Most node-table entries an arena is created with by default.
pub const MAX_MAX_ALLOCATIONS: u32 = 128 * 1024;

/// Buffer bytes per node-table entry when the count is derived.
const BYTES_PER_ALLOCATION: usize = 256;

/// Tuning knobs for [`crate::Arena`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Alignment of the first payload byte. Power of two, below 65536.
    pub base_alignment: u32,
    /// Node-table entries (simultaneously tracked regions).
    /// `None` derives it from the buffer size.
    pub max_allocations: Option<u32>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            base_alignment: DEFAULT_BASE_ALIGNMENT,
            max_allocations: None,
        }
    }
}

impl ArenaConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] on malformed TOML or
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MemoryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> MemoryResult<()> {
        if !self.base_alignment.is_power_of_two() || self.base_alignment >= MAX_SHIFT {
            return Err(MemoryError::InvalidConfig(format!(
                "base_alignment must be a power of two below {MAX_SHIFT}, got {}",
                self.base_alignment
            )));
        }
        if let Some(max) = self.max_allocations {
            if max < 2 {
                return Err(MemoryError::InvalidConfig(format!(
                    "max_allocations must be at least 2, got {max}"
                )));
            }
        }
        Ok(())
    }

    /// Node-table entries to use for a buffer of `buffer_len` bytes.
    #[must_use]
    pub fn max_allocations_for(&self, buffer_len: usize) -> u32 {
        self.max_allocations.unwrap_or_else(|| {
            let derived = buffer_len / BYTES_PER_ALLOCATION;
            derived.clamp(MIN_MAX_ALLOCATIONS as usize, MAX_MAX_ALLOCATIONS as usize) as u32
        })
    }
}

/*!
 * Pool Configuration
 * Construction parameters for retainable memory pools
 */

use crate::core::limits::{
    DEFAULT_MAX_BUCKETS_TO_PROBE, DEFAULT_MAX_BUFFERS_PER_CORE, DEFAULT_MAX_BUFFER_LENGTH,
    DEFAULT_MIN_BUFFER_LENGTH, MAX_CORE_STACKS, MAX_NATIVE_BYTES,
};
use crate::core::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};

/// Pool construction parameters
///
/// Lengths are in elements. `core_count` of `None` sizes the per-core
/// stacks from the detected topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    pub min_buffer_length: usize,
    pub max_buffer_length: usize,
    pub max_buffers_per_core: usize,
    pub max_buckets_to_probe: usize,
    #[serde(default)]
    pub rent_always_clean: bool,
    #[serde(default)]
    pub return_always_clean: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_count: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_buffer_length: DEFAULT_MIN_BUFFER_LENGTH,
            max_buffer_length: DEFAULT_MAX_BUFFER_LENGTH,
            max_buffers_per_core: DEFAULT_MAX_BUFFERS_PER_CORE,
            max_buckets_to_probe: DEFAULT_MAX_BUCKETS_TO_PROBE,
            rent_always_clean: false,
            return_always_clean: false,
            core_count: None,
        }
    }
}

impl PoolConfig {
    /// Small buffers, deep stacks
    pub fn small() -> Self {
        Self {
            min_buffer_length: 16,
            max_buffer_length: 64 * 1024,
            max_buffers_per_core: 32,
            ..Self::default()
        }
    }

    /// Large buffers, shallow stacks
    pub fn large() -> Self {
        Self {
            min_buffer_length: 4096,
            max_buffer_length: 16 * 1024 * 1024,
            max_buffers_per_core: 4,
            max_buckets_to_probe: 1,
            ..Self::default()
        }
    }

    pub fn with_min_buffer_length(mut self, length: usize) -> Self {
        self.min_buffer_length = length;
        self
    }

    pub fn with_max_buffer_length(mut self, length: usize) -> Self {
        self.max_buffer_length = length;
        self
    }

    pub fn with_max_buffers_per_core(mut self, count: usize) -> Self {
        self.max_buffers_per_core = count;
        self
    }

    pub fn with_max_buckets_to_probe(mut self, count: usize) -> Self {
        self.max_buckets_to_probe = count;
        self
    }

    pub fn with_rent_always_clean(mut self, clean: bool) -> Self {
        self.rent_always_clean = clean;
        self
    }

    pub fn with_return_always_clean(mut self, clean: bool) -> Self {
        self.return_always_clean = clean;
        self
    }

    pub fn with_core_count(mut self, cores: usize) -> Self {
        self.core_count = Some(cores);
        self
    }

    /// Reject unusable parameters
    pub fn validate(&self) -> MemoryResult<()> {
        if self.min_buffer_length == 0 {
            return Err(MemoryError::Configuration(
                "min_buffer_length must be positive".into(),
            ));
        }
        if self.max_buffer_length < self.min_buffer_length {
            return Err(MemoryError::Configuration(format!(
                "max_buffer_length {} is below min_buffer_length {}",
                self.max_buffer_length, self.min_buffer_length
            )));
        }
        // Pools round the maximum up to the next size class
        if self.max_buffer_length.next_power_of_two() > MAX_NATIVE_BYTES {
            return Err(MemoryError::Configuration(format!(
                "max_buffer_length {} rounds up past {}",
                self.max_buffer_length, MAX_NATIVE_BYTES
            )));
        }
        if self.max_buffers_per_core == 0 {
            return Err(MemoryError::Configuration(
                "max_buffers_per_core must be positive".into(),
            ));
        }
        match self.core_count {
            Some(0) => Err(MemoryError::Configuration(
                "core_count must be positive".into(),
            )),
            Some(cores) if cores > MAX_CORE_STACKS => Err(MemoryError::Configuration(format!(
                "core_count {} exceeds {}",
                cores, MAX_CORE_STACKS
            ))),
            _ => Ok(()),
        }
    }

    /// Per-core stack count after topology detection
    pub(crate) fn effective_core_count(&self) -> usize {
        self.core_count
            .unwrap_or_else(crate::core::core_count)
            .clamp(1, MAX_CORE_STACKS)
    }
}

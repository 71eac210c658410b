/*!
 * Memory Settings
 *
 * Process-wide runtime settings: the correctness-check switch and the
 * alignment bounds derived from the safe cache line.
 */

use super::limits::{MAX_NATIVE_ALIGNMENT, MIN_NATIVE_ALIGNMENT, SAFE_CACHE_LINE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Environment variable consulted once, at first use of the settings
pub const CORRECTNESS_CHECKS_ENV: &str = "PINNED_MEMORY_CORRECTNESS_CHECKS";

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Global memory settings
#[derive(Debug)]
pub struct Settings {
    correctness_checks: AtomicBool,
    safe_cache_line: usize,
}

impl Settings {
    /// Get or initialize the global settings
    pub fn global() -> &'static Self {
        SETTINGS.get_or_init(|| {
            let checks = std::env::var(CORRECTNESS_CHECKS_ENV)
                .map(|value| Self::parse_switch(&value))
                .unwrap_or(true);

            if !checks {
                log::info!("Correctness checks disabled via {}", CORRECTNESS_CHECKS_ENV);
            }

            Self {
                correctness_checks: AtomicBool::new(checks),
                safe_cache_line: SAFE_CACHE_LINE,
            }
        })
    }

    fn parse_switch(value: &str) -> bool {
        !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        )
    }

    /// Whether optional bounds checks run
    #[inline(always)]
    pub fn correctness_checks(&self) -> bool {
        self.correctness_checks.load(Ordering::Relaxed)
    }

    /// Cache line size used for alignment bounds
    #[inline]
    pub fn safe_cache_line(&self) -> usize {
        self.safe_cache_line
    }

    /// Smallest native alignment
    #[inline]
    pub fn min_alignment(&self) -> usize {
        MIN_NATIVE_ALIGNMENT
    }

    /// Largest native alignment (twice the safe cache line)
    #[inline]
    pub fn max_alignment(&self) -> usize {
        (2 * self.safe_cache_line).min(MAX_NATIVE_ALIGNMENT)
    }

    /// Clamp an alignment request into the supported power-of-two range
    #[inline]
    pub fn clamp_alignment(&self, alignment: usize) -> usize {
        alignment
            .max(1)
            .next_power_of_two()
            .clamp(self.min_alignment(), self.max_alignment())
    }
}

/// Whether optional correctness checks are enabled
#[inline(always)]
pub fn correctness_checks_enabled() -> bool {
    Settings::global().correctness_checks()
}

/// Turn optional correctness checks on
pub fn enable_correctness_checks() {
    Settings::global()
        .correctness_checks
        .store(true, Ordering::Relaxed);
}

/// Turn optional correctness checks off
///
/// # Safety
///
/// With checks off, buffers built with
/// [`DirectBuffer::from_raw_parts`](crate::memory::DirectBuffer::from_raw_parts)
/// skip bounds validation. The caller guarantees every offset passed to them
/// stays inside the buffer until checks are enabled again.
pub unsafe fn disable_correctness_checks() {
    Settings::global()
        .correctness_checks
        .store(false, Ordering::Relaxed);
}

/*!
 * Memory Diagnostics
 *
 * Process-wide counters for external telemetry. Relaxed atomics only:
 * the numbers are observational and never drive correctness.
 */

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static NATIVE_BYTES_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static NATIVE_BYTES_RELEASED: AtomicU64 = AtomicU64::new(0);
static NATIVE_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static NATIVE_FREES: AtomicU64 = AtomicU64::new(0);
static POOL_RENTS: AtomicU64 = AtomicU64::new(0);
static POOL_HITS: AtomicU64 = AtomicU64::new(0);
static POOL_MISSES: AtomicU64 = AtomicU64::new(0);
static POOL_RETURNS: AtomicU64 = AtomicU64::new(0);
static POOL_REJECTIONS: AtomicU64 = AtomicU64::new(0);
static POOL_OVERSIZE: AtomicU64 = AtomicU64::new(0);
static POOL_CONTENTION: AtomicU64 = AtomicU64::new(0);

#[inline]
fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

pub(crate) fn record_native_allocation(bytes: usize) {
    bump(&NATIVE_ALLOCATIONS, 1);
    bump(&NATIVE_BYTES_ALLOCATED, bytes as u64);
}

pub(crate) fn record_native_free(bytes: usize) {
    bump(&NATIVE_FREES, 1);
    bump(&NATIVE_BYTES_RELEASED, bytes as u64);
}

/// Pool-level events mirrored into the process-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolEvent {
    Rent,
    Hit,
    Miss,
    Return,
    Rejection,
    Oversize,
    Contention,
}

pub(crate) fn record_pool_event(event: PoolEvent) {
    let counter = match event {
        PoolEvent::Rent => &POOL_RENTS,
        PoolEvent::Hit => &POOL_HITS,
        PoolEvent::Miss => &POOL_MISSES,
        PoolEvent::Return => &POOL_RETURNS,
        PoolEvent::Rejection => &POOL_REJECTIONS,
        PoolEvent::Oversize => &POOL_OVERSIZE,
        PoolEvent::Contention => &POOL_CONTENTION,
    };
    bump(counter, 1);
}

/// Snapshot of the process-wide memory counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub native_bytes_allocated: u64,
    pub native_bytes_released: u64,
    pub native_allocations: u64,
    pub native_frees: u64,
    pub pool_rents: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub pool_returns: u64,
    pub pool_rejections: u64,
    pub pool_oversize: u64,
    pub pool_contention: u64,
}

impl MemoryStats {
    /// Native bytes currently outstanding
    pub fn native_bytes_in_use(&self) -> u64 {
        self.native_bytes_allocated
            .saturating_sub(self.native_bytes_released)
    }

    /// Fraction of pool rents served from a bucket
    pub fn pool_hit_ratio(&self) -> f64 {
        if self.pool_rents == 0 {
            0.0
        } else {
            self.pool_hits as f64 / self.pool_rents as f64
        }
    }
}

/// Read the process-wide counters
pub fn memory_stats() -> MemoryStats {
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
    MemoryStats {
        native_bytes_allocated: load(&NATIVE_BYTES_ALLOCATED),
        native_bytes_released: load(&NATIVE_BYTES_RELEASED),
        native_allocations: load(&NATIVE_ALLOCATIONS),
        native_frees: load(&NATIVE_FREES),
        pool_rents: load(&POOL_RENTS),
        pool_hits: load(&POOL_HITS),
        pool_misses: load(&POOL_MISSES),
        pool_returns: load(&POOL_RETURNS),
        pool_rejections: load(&POOL_REJECTIONS),
        pool_oversize: load(&POOL_OVERSIZE),
        pool_contention: load(&POOL_CONTENTION),
    }
}

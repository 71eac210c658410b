/*!
 * Pinned Memory
 *
 * Reference-counted pinned buffers of typed elements, per-core pools that
 * recycle them, and counted views that keep them alive.
 *
 * # Example
 *
 * ```ignore
 * use pinned_memory::{MemoryExt, PoolConfig, RetainableMemoryPool};
 *
 * let pool = RetainableMemoryPool::<u8>::private(PoolConfig::default())?;
 * let memory = pool.rent_memory(4096)?;
 * let mut view = memory.retain_len(4096)?;
 * view.as_mut_slice()?.fill(0xFF);
 * drop(view); // last release returns the memory to the pool
 * ```
 */

#![cfg_attr(feature = "nightly", feature(core_intrinsics))]

pub mod core;
pub mod memory;

// Re-exports
pub use crate::core::{
    correctness_checks_enabled, disable_correctness_checks, enable_correctness_checks,
    CounterError, MemoryError, MemoryResult, Settings, TypeTag,
};
pub use memory::{
    memory_stats, ArrayMemory, DirectBuffer, Element, MemoryExt, MemoryKind, MemoryStats,
    OffHeapMemory, PoolConfig, PoolId, PrivateMemory, RetainableMemory, RetainableMemoryPool,
    RetainedMemory, RetainedVec, SharedMemory, VecStorage,
};

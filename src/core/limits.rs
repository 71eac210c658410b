/*!
 * Memory Limits and Constants
 *
 * Centralized location for pool sizing, alignment bounds and counter limits.
 *
 * ## Conventions
 * - Lengths are element counts unless the name says BYTES
 * - Performance-critical constants are marked with [PERF]
 * - Values that must stay powers of two are marked with [POW2]
 */

// =============================================================================
// ALIGNMENT
// =============================================================================

/// Conservative cache line size used for padding and alignment bounds
/// [PERF] Covers x86-64 and most ARM64 parts (adjacent-line prefetch aside)
pub const SAFE_CACHE_LINE: usize = 64;

/// Smallest alignment handed out by the native allocation paths
/// [POW2]
pub const MIN_NATIVE_ALIGNMENT: usize = 8;

/// Largest alignment handed out by the native allocation paths
/// [POW2]
pub const MAX_NATIVE_ALIGNMENT: usize = 2 * SAFE_CACHE_LINE;

/// Largest native block in bytes (i32::MAX, the library's length domain)
pub const MAX_NATIVE_BYTES: usize = i32::MAX as usize;

// =============================================================================
// POOL SIZING
// =============================================================================

/// Default smallest pooled buffer length
/// [POW2]
pub const DEFAULT_MIN_BUFFER_LENGTH: usize = 16;

/// Default largest pooled buffer length (1M elements)
/// [POW2] Larger requests bypass pooling
pub const DEFAULT_MAX_BUFFER_LENGTH: usize = 1024 * 1024;

/// Default number of instances kept per core in each bucket
/// [PERF] Small stacks keep cold memory from piling up per core
pub const DEFAULT_MAX_BUFFERS_PER_CORE: usize = 8;

/// Default number of larger buckets probed after a miss in the target bucket
pub const DEFAULT_MAX_BUCKETS_TO_PROBE: usize = 2;

/// Upper bound on per-core stacks in a bucket
pub const MAX_CORE_STACKS: usize = 256;

// =============================================================================
// ARRAY AND OBJECT POOLS
// =============================================================================

/// Smallest array size class in the shared array pool
/// [POW2]
pub const ARRAY_POOL_MIN_LENGTH: usize = 16;

/// Largest array size class in the shared array pool
/// [POW2]
pub const ARRAY_POOL_MAX_LENGTH: usize = 1024 * 1024;

/// Arrays kept per size class in the shared array pool
pub const ARRAY_POOL_ARRAYS_PER_CLASS: usize = 32;

/// Shells kept per core slot in an object pool
pub const OBJECT_POOL_SLOT_CAPACITY: usize = 16;

/// Off-heap buffers kept by a default off-heap buffer pool
pub const OFFHEAP_POOL_CAPACITY: usize = 16;

/// Largest off-heap buffer (in elements) a default off-heap pool keeps
pub const OFFHEAP_POOL_MAX_LENGTH: usize = 4 * 1024 * 1024;

// =============================================================================
// REFERENCE COUNTING
// =============================================================================

/// Maximum number of outstanding references on one counter
pub const MAX_REFERENCE_COUNT: u32 = 0x00FF_FFFF;

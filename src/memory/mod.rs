/*!
 * Memory Module
 * Retainable memory, pools and retained views
 */

pub mod allocator;
pub mod array;
pub mod array_pool;
pub mod counter;
pub mod direct;
pub mod element;
pub mod object_pool;
pub mod offheap;
pub mod pool;
pub mod private;
pub mod retainable;
pub mod retained;
pub mod stats;
pub mod vec;

// Re-export for convenience
pub use allocator::{NativeAllocator, NativeBlock};
pub use array::ArrayMemory;
pub use array_pool::ArrayPool;
pub use counter::AtomicCounter;
pub use direct::DirectBuffer;
pub use element::Element;
pub use object_pool::ObjectPool;
pub use offheap::{OffHeapBuffer, OffHeapBufferPool, OffHeapMemory};
pub use pool::{
    known_pools, pool_info, MemoryFactory, PoolConfig, PoolId, PoolInfo, PoolStats,
    RetainableMemoryPool,
};
pub use private::PrivateMemory;
pub use retainable::{
    MemoryCore, MemoryExt, MemoryKind, PinnedHandle, RetainableMemory, SharedMemory,
};
pub use retained::{RetainedMemory, RetainedSlice};
pub use stats::{memory_stats, MemoryStats};
pub use vec::{ErasedOwner, RetainedVec, VecRegion, VecStorage};

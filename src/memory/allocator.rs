/*!
 * Native Allocator
 *
 * Pluggable aligned allocate/free pair used by every native memory path.
 *
 * The pair is process-wide. A custom pair may be installed once, before the
 * first native allocation; blocks must always be freed by the pair that
 * allocated them, so swapping afterwards is refused.
 */

use super::stats;
use crate::core::{MemoryError, MemoryResult, Settings};
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// A native block: address, usable size and alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBlock {
    pub ptr: NonNull<u8>,
    /// Usable size in bytes, at least the requested size
    pub size: usize,
    pub alignment: usize,
}

// A block is an address plus its layout; ownership is tracked by the holder
unsafe impl Send for NativeBlock {}
unsafe impl Sync for NativeBlock {}

/// Allocate at least `required` bytes aligned to `alignment`
///
/// Never returns a null block: failure is `MemoryError::OutOfMemory`.
pub type AllocateFn = fn(required: usize, alignment: usize) -> MemoryResult<NativeBlock>;

/// Release a block produced by the matching [`AllocateFn`]
///
/// # Safety
///
/// `block` must come from the paired allocate function and be freed once.
pub type FreeFn = unsafe fn(block: NativeBlock);

/// Allocate/free function pair
#[derive(Clone, Copy)]
pub struct NativeAllocator {
    allocate: AllocateFn,
    free: FreeFn,
    name: &'static str,
}

static INSTALLED: OnceLock<NativeAllocator> = OnceLock::new();
static IN_USE: AtomicBool = AtomicBool::new(false);

impl NativeAllocator {
    /// Build a pair from custom delegates
    pub const fn new(allocate: AllocateFn, free: FreeFn, name: &'static str) -> Self {
        Self {
            allocate,
            free,
            name,
        }
    }

    /// Pair backed by the Rust global allocator
    pub const fn system() -> Self {
        Self::new(system_allocate, system_free, "system")
    }

    /// Pair backed by jemalloc
    #[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
    pub const fn jemalloc() -> Self {
        Self::new(jemalloc_allocate, jemalloc_free, "jemalloc")
    }

    /// Installed pair, defaulting to [`NativeAllocator::system`]
    pub fn global() -> &'static Self {
        INSTALLED.get_or_init(Self::system)
    }

    /// Install a custom pair for the whole process
    ///
    /// Runs a synchronous self test first. Fails when a pair was already
    /// installed or any native allocation has happened.
    pub fn set_delegates(allocate: AllocateFn, free: FreeFn) -> MemoryResult<()> {
        Self::install(Self::new(allocate, free, "custom"))
    }

    /// Install `allocator` for the whole process
    pub fn install(allocator: NativeAllocator) -> MemoryResult<()> {
        if IN_USE.load(Ordering::Acquire) || INSTALLED.get().is_some() {
            return Err(MemoryError::AllocatorAlreadySet);
        }

        allocator.self_test()?;

        INSTALLED
            .set(allocator)
            .map_err(|_| MemoryError::AllocatorAlreadySet)?;
        tracing::info!(allocator = allocator.name, "Native allocator installed");
        Ok(())
    }

    /// Allocator name for diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allocate through this pair
    pub fn allocate(&self, required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
        if !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment {
                alignment,
                min: 1,
                max: Settings::global().max_alignment(),
            });
        }
        let block = (self.allocate)(required, alignment)?;
        debug_assert!(block.size >= required);
        debug_assert_eq!(block.ptr.as_ptr() as usize % alignment, 0);
        Ok(block)
    }

    /// Free through this pair
    ///
    /// # Safety
    ///
    /// `block` must come from this pair's `allocate` and be freed once.
    pub unsafe fn free(&self, block: NativeBlock) {
        (self.free)(block)
    }

    /// Allocate and release a spread of sizes and alignments
    pub fn self_test(&self) -> MemoryResult<()> {
        const SIZES: [usize; 8] = [1, 7, 64, 1000, 4096, 65_536, 100_000, 1 << 20];
        let settings = Settings::global();
        let mut alignment = settings.min_alignment();

        while alignment <= settings.max_alignment() {
            for &size in &SIZES {
                let block = (self.allocate)(size, alignment).map_err(|err| {
                    MemoryError::AllocatorSelfTest(format!(
                        "allocate({}, {}) failed: {}",
                        size, alignment, err
                    ))
                })?;

                if block.size < size || block.ptr.as_ptr() as usize % alignment != 0 {
                    let message = format!(
                        "allocate({}, {}) returned {} bytes at {:p}",
                        size, alignment, block.size, block.ptr
                    );
                    unsafe { (self.free)(block) };
                    return Err(MemoryError::AllocatorSelfTest(message));
                }

                unsafe {
                    block.ptr.as_ptr().write(0xA5);
                    block.ptr.as_ptr().add(size - 1).write(0x5A);
                    (self.free)(block);
                }
            }
            alignment *= 2;
        }
        Ok(())
    }
}

impl fmt::Debug for NativeAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAllocator")
            .field("name", &self.name)
            .finish()
    }
}

/// Allocate a native block through the installed pair
pub fn allocate(required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
    IN_USE.store(true, Ordering::Release);
    let block = NativeAllocator::global().allocate(required, alignment)?;
    stats::record_native_allocation(block.size);
    Ok(block)
}

/// Release a native block through the installed pair
///
/// # Safety
///
/// `block` must come from [`allocate`] and be freed once.
pub unsafe fn free(block: NativeBlock) {
    stats::record_native_free(block.size);
    NativeAllocator::global().free(block)
}

/// Allocate a zero-filled native block
pub fn allocate_zeroed(required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
    let block = allocate(required, alignment)?;
    unsafe { std::ptr::write_bytes(block.ptr.as_ptr(), 0, block.size) };
    Ok(block)
}

fn layout_for(required: usize, alignment: usize) -> MemoryResult<Layout> {
    Layout::from_size_align(required.max(1), alignment)
        .map(|layout| layout.pad_to_align())
        .map_err(|_| MemoryError::OutOfMemory {
            requested: required,
            alignment,
        })
}

fn system_allocate(required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
    let layout = layout_for(required, alignment)?;
    let ptr = unsafe { std::alloc::alloc(layout) };
    NonNull::new(ptr)
        .map(|ptr| NativeBlock {
            ptr,
            size: layout.size(),
            alignment,
        })
        .ok_or(MemoryError::OutOfMemory {
            requested: required,
            alignment,
        })
}

unsafe fn system_free(block: NativeBlock) {
    let layout = Layout::from_size_align_unchecked(block.size, block.alignment);
    std::alloc::dealloc(block.ptr.as_ptr(), layout);
}

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
fn jemalloc_allocate(required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
    use std::alloc::GlobalAlloc;
    let layout = layout_for(required, alignment)?;
    let ptr = unsafe { tikv_jemallocator::Jemalloc.alloc(layout) };
    NonNull::new(ptr)
        .map(|ptr| NativeBlock {
            ptr,
            size: layout.size(),
            alignment,
        })
        .ok_or(MemoryError::OutOfMemory {
            requested: required,
            alignment,
        })
}

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
unsafe fn jemalloc_free(block: NativeBlock) {
    use std::alloc::GlobalAlloc;
    let layout = Layout::from_size_align_unchecked(block.size, block.alignment);
    tikv_jemallocator::Jemalloc.dealloc(block.ptr.as_ptr(), layout);
}

/*!
 * Native Allocator Tests
 * Delegate installation, self test and allocation guarantees
 */

use pinned_memory::memory::allocator::{self, NativeAllocator, NativeBlock};
use pinned_memory::{memory_stats, MemoryError, MemoryResult};
use serial_test::serial;
use std::alloc::Layout;
use std::ptr::NonNull;

const FIXED_BLOCK: usize = 64;

/// Always hands out 64 bytes, whatever was asked for
fn fixed_allocate(_required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
    let layout = Layout::from_size_align(FIXED_BLOCK, alignment).map_err(|_| {
        MemoryError::OutOfMemory {
            requested: FIXED_BLOCK,
            alignment,
        }
    })?;
    let ptr = NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or(
        MemoryError::OutOfMemory {
            requested: FIXED_BLOCK,
            alignment,
        },
    )?;
    Ok(NativeBlock {
        ptr,
        size: FIXED_BLOCK,
        alignment,
    })
}

unsafe fn layout_free(block: NativeBlock) {
    let layout = Layout::from_size_align_unchecked(block.size, block.alignment);
    std::alloc::dealloc(block.ptr.as_ptr(), layout);
}

fn failing_allocate(required: usize, alignment: usize) -> MemoryResult<NativeBlock> {
    Err(MemoryError::OutOfMemory {
        requested: required,
        alignment,
    })
}

#[test]
fn test_system_pair_passes_self_test() {
    assert!(NativeAllocator::system().self_test().is_ok());
}

#[test]
fn test_undersized_pair_fails_self_test() {
    let allocator = NativeAllocator::new(fixed_allocate, layout_free, "fixed");
    assert!(matches!(
        allocator.self_test(),
        Err(MemoryError::AllocatorSelfTest(_))
    ));
}

#[test]
fn test_failing_pair_fails_self_test() {
    let allocator = NativeAllocator::new(failing_allocate, layout_free, "failing");
    assert!(matches!(
        allocator.self_test(),
        Err(MemoryError::AllocatorSelfTest(_))
    ));
}

#[test]
#[serial]
fn test_set_delegates_after_first_allocation_fails() {
    let block = allocator::allocate(32, 8).unwrap();
    unsafe { allocator::free(block) };

    assert_eq!(
        NativeAllocator::set_delegates(fixed_allocate, layout_free),
        Err(MemoryError::AllocatorAlreadySet)
    );
    assert_eq!(NativeAllocator::global().name(), "system");
}

#[test]
#[serial]
fn test_blocks_are_aligned_and_sized() {
    for alignment in [8usize, 16, 32, 64, 128] {
        for size in [1usize, 7, 100, 4096] {
            let block = allocator::allocate(size, alignment).unwrap();
            assert!(block.size >= size);
            assert_eq!(block.ptr.as_ptr() as usize % alignment, 0);
            assert_eq!(block.alignment, alignment);
            unsafe { allocator::free(block) };
        }
    }
}

#[test]
#[serial]
fn test_zeroed_allocation() {
    let block = allocator::allocate_zeroed(256, 16).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(block.ptr.as_ptr(), block.size) };
    assert!(bytes.iter().all(|&b| b == 0));
    unsafe { allocator::free(block) };
}

#[test]
fn test_non_power_of_two_alignment_rejected() {
    assert!(matches!(
        allocator::allocate(64, 24),
        Err(MemoryError::InvalidAlignment { alignment: 24, .. })
    ));
}

#[test]
#[serial]
fn test_allocations_are_counted() {
    let before = memory_stats();
    let block = allocator::allocate(1000, 8).unwrap();
    let during = memory_stats();
    unsafe { allocator::free(block) };
    let after = memory_stats();

    assert!(during.native_allocations > before.native_allocations);
    assert!(during.native_bytes_allocated >= before.native_bytes_allocated + 1000);
    assert!(after.native_frees > during.native_frees);
}

/*!
 * Memory Kind Tests
 * Array, private and off-heap backings through the shared retain protocol
 */

use pinned_memory::memory::{
    ArrayMemory, MemoryExt, MemoryKind, OffHeapBufferPool, OffHeapMemory, PrivateMemory,
    RetainableMemory,
};
use pinned_memory::MemoryError;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_private_blittable_is_native_only() {
    let memory = PrivateMemory::<i32>::create(100).unwrap();

    assert!(memory.pointer().is_some());
    assert!(memory.has_native());
    assert!(!memory.has_array());
    assert_eq!(memory.length(), 100);
    assert_eq!(memory.kind(), MemoryKind::Private);
    assert!(!memory.is_array_backed());
}

#[test]
fn test_private_reference_type_is_array_only() {
    let memory = PrivateMemory::<String>::create(100).unwrap();

    assert!(memory.pointer().is_none());
    assert!(!memory.has_native());
    assert!(memory.has_array());
    assert_eq!(memory.alignment(), None);
    assert!(memory.is_array_backed());
}

#[test]
fn test_private_native_memory_is_zeroed_and_aligned() {
    let memory = PrivateMemory::<u64>::create(33).unwrap();
    let alignment = memory.alignment().unwrap();
    let pointer = memory.pointer().unwrap();
    assert_eq!(pointer.as_ptr() as usize % alignment, 0);

    let view = memory.retain().unwrap();
    assert!(view.as_slice().iter().all(|&v| v == 0));
}

#[test]
fn test_array_memory_rounds_to_pooled_array() {
    let memory = ArrayMemory::<u16>::create(100).unwrap();
    assert!(memory.length() >= 100);
    assert_eq!(memory.length(), memory.array_len());
    assert!(memory.is_array_backed());
    assert!(!memory.is_external());
}

#[test]
fn test_array_memory_from_vec_keeps_contents() {
    let memory = ArrayMemory::from_vec(vec![String::from("a"), String::from("b")]);
    assert!(memory.is_external());

    let view = memory.retain().unwrap();
    assert_eq!(view.as_slice(), &["a".to_string(), "b".to_string()]);
}

#[test]
fn test_dispose_while_retained_keeps_backing() {
    let memory = PrivateMemory::<u8>::create(64).unwrap();
    let view = memory.retain().unwrap();

    assert_eq!(memory.dispose(), Err(MemoryError::Retained { count: 1 }));
    assert!(!memory.is_disposed());
    assert!(!memory.core().is_freed());
    assert_eq!(view.len(), 64);
}

#[test]
fn test_dispose_unretained_frees() {
    let memory = PrivateMemory::<u8>::create(64).unwrap();
    assert_eq!(memory.dispose(), Ok(()));
    assert!(memory.is_disposed());
    assert!(memory.pointer().is_none());
    assert_eq!(memory.dispose(), Err(MemoryError::Disposed));
}

#[test]
fn test_last_release_frees_standalone_memory() {
    let memory = ArrayMemory::<u32>::create(16).unwrap();
    let view = memory.retain().unwrap();
    drop(view);
    assert!(memory.is_disposed());
    assert!(matches!(memory.retain(), Err(MemoryError::Disposed)));
}

#[test]
fn test_pin_counts_as_reference() {
    let memory = PrivateMemory::<u32>::create(8).unwrap();
    let _anchor = memory.retain().unwrap();

    let pin = memory.pin(3).unwrap();
    assert_eq!(memory.reference_count(), 2);
    assert_eq!(
        pin.pointer().as_ptr() as usize - memory.pointer().unwrap().as_ptr() as usize,
        3 * std::mem::size_of::<u32>()
    );
    drop(pin);
    assert_eq!(memory.reference_count(), 1);

    assert!(matches!(
        memory.pin(8),
        Err(MemoryError::OutOfRange { .. })
    ));
    assert_eq!(memory.reference_count(), 1);
}

#[test]
fn test_offheap_length_is_buffer_capacity() {
    let memory = OffHeapMemory::<u8>::create(100, None).unwrap();
    assert!(memory.length() >= 100);
    assert_eq!(memory.kind(), MemoryKind::OffHeap);
    assert!(!memory.has_buffer_pool());
}

#[test]
fn test_offheap_growth_preserves_contents() {
    let memory = OffHeapMemory::<u32>::create(4, None).unwrap();
    {
        let _anchor = memory.retain().unwrap();
        assert!(matches!(
            memory.ensure_capacity(1024),
            Err(MemoryError::Retained { .. })
        ));
    }

    let fresh = OffHeapMemory::<u32>::create(4, None).unwrap();
    let before = fresh.length();
    unsafe { fresh.get_span().unwrap()[0] = 0xDEAD };
    fresh.ensure_capacity(before * 4).unwrap();
    assert!(fresh.length() >= before * 4);
    unsafe { assert_eq!(fresh.get_span().unwrap()[0], 0xDEAD) };
}

#[test]
fn test_offheap_buffer_goes_back_to_its_pool() {
    let buffers = OffHeapBufferPool::<u8>::new(4, 1 << 16);
    let memory = OffHeapMemory::create(256, Some(Arc::clone(&buffers))).unwrap();
    assert!(memory.has_buffer_pool());
    assert!(buffers.is_empty());

    memory.dispose().unwrap();
    assert_eq!(buffers.len(), 1);
}

#[test]
fn test_offheap_rejects_reference_types() {
    assert!(matches!(
        OffHeapMemory::<String>::create(8, None),
        Err(MemoryError::NotBlittable(_))
    ));
}

#[test]
fn test_zero_sized_elements_rejected() {
    #[derive(Default)]
    struct Nothing;
    unsafe impl pinned_memory::Element for Nothing {
        const BLITTABLE: bool = false;
    }

    assert!(matches!(
        PrivateMemory::<Nothing>::create(4),
        Err(MemoryError::SizeOverflow { .. })
    ));
}

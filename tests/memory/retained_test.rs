/*!
 * Retained Memory Tests
 * Counted views, non-counting slices and ownership transfer
 */

use pinned_memory::memory::{
    ArrayMemory, MemoryExt, PrivateMemory, RetainableMemory, RetainedMemory, SharedMemory,
};
use pinned_memory::MemoryError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_retain_dispose_round_trip() {
    let memory = PrivateMemory::<u32>::create(64).unwrap();
    let _anchor = memory.retain().unwrap();
    assert_eq!(memory.reference_count(), 1);

    memory.retain().unwrap().dispose();
    assert_eq!(memory.reference_count(), 1);
}

#[test]
fn test_slice_does_not_count() {
    let memory = PrivateMemory::<u8>::create(32).unwrap();
    let view = memory.retain().unwrap();

    let slice = view.slice(8, 8).unwrap();
    let inner = slice.slice(2, 4).unwrap();
    assert_eq!(memory.reference_count(), 1);
    assert_eq!(inner.len(), 4);
    assert!(view.slice(30, 4).is_err());
}

#[test]
fn test_clone_counts_once() {
    let memory = PrivateMemory::<u8>::create(32).unwrap();
    let view = memory.retain().unwrap();

    let copy = view.clone_range(4, 4).unwrap();
    assert_eq!(memory.reference_count(), 2);
    assert_eq!(copy.start(), 4);

    let full = view.clone();
    assert_eq!(memory.reference_count(), 3);

    drop(copy);
    drop(full);
    assert_eq!(memory.reference_count(), 1);
}

#[test]
fn test_writes_visible_through_other_views() {
    let memory = PrivateMemory::<i64>::create(8).unwrap();
    let mut view = memory.retain().unwrap();
    view.as_mut_slice().unwrap()[5] = -9;

    let other = view.clone_range(5, 1).unwrap();
    assert_eq!(other.as_slice(), &[-9]);
}

#[test]
fn test_mutation_needs_unique_reference() {
    let memory = ArrayMemory::<u16>::create(16).unwrap();
    let mut view = memory.retain().unwrap();
    let other = view.clone();

    assert_eq!(
        view.as_mut_slice().err(),
        Some(MemoryError::Aliased { count: 2 })
    );
    drop(other);
    assert!(view.as_mut_slice().is_ok());
}

#[test]
fn test_retain_range_bounds() {
    let memory = PrivateMemory::<u8>::create(16).unwrap();
    let _anchor = memory.retain().unwrap();

    assert!(memory.retain_range(8, 8).is_ok());
    assert_eq!(
        memory.retain_range(8, 9).err(),
        Some(MemoryError::OutOfRange {
            start: 8,
            length: 9,
            bound: 16
        })
    );
    assert_eq!(memory.reference_count(), 1);
}

#[test]
fn test_from_vec_wraps_array() {
    let view = RetainedMemory::from(vec![1u8, 2, 3]);
    assert_eq!(&*view, &[1, 2, 3]);
    assert_eq!(view.reference_count(), 1);
    assert!(!view.is_externally_owned());
}

#[test]
fn test_try_from_shared_memory() {
    let memory: SharedMemory<u32> = PrivateMemory::<u32>::create(4).unwrap();
    let view = RetainedMemory::<u32>::try_from(memory.clone()).unwrap();
    assert_eq!(view.len(), 4);
    assert_eq!(memory.reference_count(), 1);
    drop(view);

    // Standalone memory is freed by its last release
    assert!(matches!(
        RetainedMemory::<u32>::try_from(memory),
        Err(MemoryError::Disposed)
    ));
}

#[test]
fn test_externally_owned_handle() {
    let mut backing = [10u32, 20, 30];
    let ptr = std::ptr::NonNull::new(backing.as_mut_ptr()).unwrap();
    let view = unsafe { RetainedMemory::from_raw_parts(ptr, 3) };

    assert!(view.is_externally_owned());
    assert_eq!(view.reference_count(), 0);
    let copy = view.clone_range(1, 2).unwrap();
    assert_eq!(copy.as_slice(), &[20, 30]);
}

#[test]
fn test_direct_buffer_over_view() {
    let memory = PrivateMemory::<u32>::create(4).unwrap();
    let mut view = memory.retain().unwrap();
    {
        let buffer = view.direct_buffer().unwrap();
        assert_eq!(buffer.len(), 16);
        buffer.write_u32(8, 0xCAFE);
    }
    assert_eq!(view.as_slice()[2], 0xCAFE);

    let strings = PrivateMemory::<String>::create(4).unwrap();
    let mut names = strings.retain().unwrap();
    assert!(matches!(
        names.direct_buffer(),
        Err(MemoryError::NotBlittable(_))
    ));
}

proptest! {
    #[test]
    fn prop_retain_then_dispose_restores_count(
        length in 1usize..512,
        holders in 0usize..4,
        start_frac in 0.0f64..1.0,
    ) {
        let memory = PrivateMemory::<u8>::create(length).unwrap();
        let held: Vec<_> = (0..holders).map(|_| memory.retain().unwrap()).collect();
        let before = memory.reference_count();

        let start = ((length as f64) * start_frac) as usize;
        let view = memory.retain_range(start, length - start).unwrap();
        prop_assert_eq!(memory.reference_count(), before + 1);
        view.dispose();
        prop_assert_eq!(memory.reference_count(), before);
        drop(held);
    }

    #[test]
    fn prop_slice_never_counts_clone_counts_once(
        length in 1usize..256,
        start in 0usize..256,
        len in 0usize..256,
    ) {
        let memory = ArrayMemory::<u8>::create(length).unwrap();
        let view = memory.retain().unwrap();
        let bound = view.len();
        let fits = start + len <= bound;

        prop_assert_eq!(view.slice(start, len).is_ok(), fits);
        prop_assert_eq!(memory.reference_count(), 1);

        match view.clone_range(start, len) {
            Ok(copy) => {
                prop_assert!(fits);
                prop_assert_eq!(memory.reference_count(), 2);
                drop(copy);
            }
            Err(err) => {
                prop_assert!(!fits);
                let out_of_range = matches!(err, MemoryError::OutOfRange { .. });
                prop_assert!(out_of_range);
            }
        }
        prop_assert_eq!(memory.reference_count(), 1);
    }
}

/*!
 * Type-Erased View Tests
 * Runtime type tags, region discrimination and storage ranges
 */

use pinned_memory::core::type_tag;
use pinned_memory::memory::{
    ArrayMemory, MemoryExt, OffHeapMemory, PrivateMemory, RetainableMemory, RetainedVec,
    VecRegion, VecStorage,
};
use pinned_memory::MemoryError;
use pretty_assertions::assert_eq;

#[test]
fn test_tags_are_stable_and_distinct() {
    assert_eq!(type_tag::<u8>(), type_tag::<u8>());
    assert_ne!(type_tag::<u8>(), type_tag::<i8>());
    assert_ne!(type_tag::<String>(), type_tag::<Vec<u8>>());

    let info = type_tag::<u64>().info().unwrap();
    assert_eq!(info.size, 8);
    assert!(info.blittable);
    assert!(!type_tag::<String>().info().unwrap().blittable);
}

#[test]
fn test_region_follows_backing() {
    let offheap = OffHeapMemory::<f32>::create(16, None).unwrap();
    let vec = RetainedVec::from(offheap.retain().unwrap());
    assert!(matches!(vec.region(), VecRegion::Native(_)));

    let array = ArrayMemory::<f32>::create(16).unwrap();
    let vec = RetainedVec::from(array.retain().unwrap());
    assert!(matches!(vec.region(), VecRegion::Array(_)));
}

#[test]
fn test_wrong_type_is_rejected() {
    let memory = ArrayMemory::from_vec(vec!["x".to_string()]);
    let mut vec = RetainedVec::from(memory.retain().unwrap());

    assert_eq!(vec.as_slice::<String>().unwrap(), &["x".to_string()]);
    assert!(matches!(
        vec.as_mut_slice::<u64>(),
        Err(MemoryError::TypeMismatch { .. })
    ));
    assert!(matches!(
        vec.get::<u8>(0),
        Err(MemoryError::TypeMismatch { .. })
    ));
}

#[test]
fn test_erased_view_keeps_memory_alive() {
    let memory = PrivateMemory::<u32>::create(8).unwrap();
    let vec = RetainedVec::from(memory.retain().unwrap());
    assert_eq!(memory.reference_count(), 1);

    let narrowed = vec.slice(2, 2).unwrap();
    assert_eq!(memory.reference_count(), 1);
    assert!(!memory.is_disposed());

    drop(narrowed);
    assert!(memory.is_disposed());
}

#[test]
fn test_failed_slice_releases_borrow() {
    let memory = PrivateMemory::<u32>::create(8).unwrap();
    let _anchor = memory.retain().unwrap();
    let vec = RetainedVec::from(memory.retain().unwrap());
    assert_eq!(memory.reference_count(), 2);

    assert!(matches!(
        vec.slice(6, 4),
        Err(MemoryError::OutOfRange { .. })
    ));
    assert_eq!(memory.reference_count(), 1);
}

#[test]
fn test_mutation_through_erased_view() {
    let memory = PrivateMemory::<i16>::create(4).unwrap();
    let anchor = memory.retain().unwrap();
    let mut storage = VecStorage::create::<i16, _>(&memory, 0, 4).unwrap();

    assert_eq!(
        storage.vec_mut().as_mut_slice::<i16>().err(),
        Some(MemoryError::Aliased { count: 2 })
    );

    drop(anchor);
    // Only the storage's borrow remains
    storage.vec_mut().as_mut_slice::<i16>().unwrap()[3] = 12;
    assert_eq!(*storage.vec().get::<i16>(3).unwrap(), 12);
    assert_eq!(storage.type_tag(), type_tag::<i16>());
}

#[test]
fn test_storage_range_checked() {
    let memory = ArrayMemory::<u8>::create(16).unwrap();
    let _anchor = memory.retain().unwrap();
    assert!(matches!(
        VecStorage::create::<u8, _>(&memory, 10, 10),
        Err(MemoryError::OutOfRange { .. })
    ));
    assert_eq!(memory.reference_count(), 1);
}

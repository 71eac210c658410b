/*!
 * Retainable Memory Pool Tests
 * Size classes, reuse, clean policies and teardown
 */

use pinned_memory::memory::{
    known_pools, pool_info, MemoryExt, PoolConfig, RetainableMemory, RetainableMemoryPool,
};
use pinned_memory::MemoryError;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn single_core() -> PoolConfig {
    PoolConfig::default()
        .with_min_buffer_length(16)
        .with_max_buffer_length(64 * 1024)
        .with_core_count(1)
}

fn fill<M: RetainableMemory<u8> + ?Sized>(memory: &std::sync::Arc<M>, value: u8) {
    let mut view = memory.retain().unwrap();
    view.as_mut_slice().unwrap().fill(value);
}

#[test]
fn test_rent_return_rent_reuses_instance() {
    let pool =
        RetainableMemoryPool::<u8>::private(single_core().with_rent_always_clean(true)).unwrap();

    let memory = pool.rent_memory(64).unwrap();
    assert!(memory.length() >= 64);
    assert_eq!(memory.reference_count(), 0);
    {
        let view = memory.retain().unwrap();
        assert!(view.as_slice().iter().all(|&b| b == 0));
    }
    let first = memory.pointer();

    // Releasing the last retain returned it already
    assert!(memory.is_pooled());
    drop(memory);

    let again = pool.rent_memory(64).unwrap();
    assert_eq!(again.pointer(), first);
    assert_eq!(again.reference_count(), 0);
}

#[test]
fn test_explicit_return_then_rent() {
    let pool = RetainableMemoryPool::<u32>::array(single_core()).unwrap();
    let memory = pool.rent_memory(100).unwrap();
    let first = memory.pointer();

    assert_eq!(pool.return_memory(memory, false), Ok(true));
    assert_eq!(pool.pooled_count(), 1);

    let again = pool.rent_memory(128).unwrap();
    assert_eq!(again.pointer(), first);
    assert_eq!(pool.pooled_count(), 0);
}

#[test]
fn test_return_always_clean_zeroes_content() {
    let pool =
        RetainableMemoryPool::<u8>::private(single_core().with_return_always_clean(true))
            .unwrap();
    let memory = pool.rent_memory(32).unwrap();
    fill(&memory, 0xAB);
    assert!(memory.is_pooled());
    drop(memory);

    let again = pool.rent_memory(32).unwrap();
    let view = again.retain().unwrap();
    assert!(view.as_slice().iter().all(|&b| b == 0));
}

#[test]
fn test_dirty_return_keeps_content() {
    let pool = RetainableMemoryPool::<u8>::private(single_core()).unwrap();
    let memory = pool.rent_memory(32).unwrap();
    fill(&memory, 0x11);
    drop(memory);

    let again = pool.rent_memory(32).unwrap();
    let view = again.retain().unwrap();
    assert!(view.as_slice().iter().all(|&b| b == 0x11));
}

#[test]
fn test_explicit_clear_on_return() {
    let pool = RetainableMemoryPool::<u8>::private(single_core()).unwrap();
    let memory = pool.rent_memory(32).unwrap();
    fill(&memory, 7);
    drop(memory);

    // Pooled dirty by the last release; hand it back again with clearing
    let again = pool.rent_memory(32).unwrap();
    assert_eq!(pool.return_memory(again, true), Ok(true));

    let cleared = pool.rent_memory(32).unwrap();
    let view = cleared.retain().unwrap();
    assert!(view.as_slice().iter().all(|&b| b == 0));
}

#[test]
fn test_reference_types_cleared_on_return() {
    let pool = RetainableMemoryPool::<String>::array(single_core()).unwrap();
    let memory = pool.rent_memory(16).unwrap();
    {
        let mut view = memory.retain().unwrap();
        view.as_mut_slice().unwrap()[0] = "held".to_string();
    }
    drop(memory);

    let again = pool.rent_memory(16).unwrap();
    let view = again.retain().unwrap();
    assert!(view.as_slice().iter().all(String::is_empty));
}

#[test]
fn test_rent_after_dispose_fails() {
    let pool = RetainableMemoryPool::<u8>::array(single_core()).unwrap();
    let id = pool.id();
    assert!(pool_info(id).is_some());

    pool.dispose();
    pool.dispose();
    assert!(pool.is_disposed());
    assert!(pool_info(id).is_none());
    assert!(matches!(pool.rent_memory(16), Err(MemoryError::Disposed)));
}

#[test]
fn test_memory_outliving_pool_is_freed() {
    let pool = RetainableMemoryPool::<u8>::private(single_core()).unwrap();
    let memory = pool.rent_memory(16).unwrap();
    let view = memory.retain().unwrap();
    drop(pool);

    drop(view);
    assert!(memory.is_disposed());
    assert!(!memory.is_pooled());
    assert!(memory.core().is_freed());
}

#[test]
fn test_registry_lists_live_pools() {
    let pool = RetainableMemoryPool::<u64>::private(single_core()).unwrap();
    let info = pool_info(pool.id()).unwrap();

    assert_eq!(info.kind, "private");
    assert_eq!(info.min_buffer_length, 16);
    assert_eq!(info.max_buffer_length, 64 * 1024);
    assert_eq!(info.bucket_count, pool.bucket_count());
    assert_eq!(info.core_count, 1);
    assert!(known_pools().iter().any(|known| known.id == pool.id()));
}

#[test]
fn test_pool_stats_serialize() {
    let pool = RetainableMemoryPool::<u8>::array(single_core()).unwrap();
    let memory = pool.rent_memory(16).unwrap();
    pool.return_memory(memory, false).unwrap();
    let _ = pool.rent_memory(16).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.rents, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.returns, 1);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["hits"], 1);
}

#[test]
fn test_min_length_rounds_up_to_power_of_two() {
    let pool = RetainableMemoryPool::<u8>::array(
        PoolConfig::default()
            .with_min_buffer_length(20)
            .with_max_buffer_length(1024)
            .with_core_count(1),
    )
    .unwrap();
    assert_eq!(pool.bucket_size(0), Some(32));
    assert_eq!(pool.rent_memory(1).unwrap().length(), 32);
}

proptest! {
    #[test]
    fn prop_rent_satisfies_request(length in 1usize..100_000) {
        let pool = RetainableMemoryPool::<u8>::private(single_core()).unwrap();
        let memory = pool.rent_memory(length).unwrap();
        prop_assert!(memory.length() >= length);
        prop_assert_eq!(memory.reference_count(), 0);
        prop_assert!(!memory.is_disposed());
    }

    #[test]
    fn prop_pooled_sizes_are_bucket_sizes(length in 1usize..=64 * 1024) {
        let pool = RetainableMemoryPool::<u16>::array(single_core()).unwrap();
        let memory = pool.rent_memory(length).unwrap();
        let index = pool.bucket_index(length);
        prop_assert_eq!(Some(memory.length()), pool.bucket_size(index));
    }
}

/*!
 * Concurrency Tests
 * Rent/return and retain/release races across threads
 */

use pinned_memory::memory::{
    MemoryExt, PoolConfig, PrivateMemory, RetainableMemory, RetainableMemoryPool,
};
use pinned_memory::MemoryError;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_parallel_rent_and_release() {
    const THREADS: u64 = 8;
    const ROUNDS: usize = 2_000;

    let pool = RetainableMemoryPool::<u8>::private(
        PoolConfig::default()
            .with_min_buffer_length(16)
            .with_max_buffer_length(4096),
    )
    .unwrap();

    thread::scope(|scope| {
        for seed in 0..THREADS {
            let pool = Arc::clone(&pool);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..ROUNDS {
                    let length = rng.gen_range(1..=4096);
                    let memory = pool.rent_memory(length).unwrap();
                    assert!(memory.length() >= length);
                    assert_eq!(memory.reference_count(), 0);

                    let mut view = memory.retain_len(length).unwrap();
                    view.as_mut_slice().unwrap()[length - 1] = seed as u8;
                    assert_eq!(view[length - 1], seed as u8);
                    // Last release hands the memory back
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.rents, THREADS * ROUNDS as u64);
    assert_eq!(stats.hits + stats.misses, stats.rents);
    assert!(stats.pooled > 0);
}

#[test]
fn test_parallel_retain_release_on_one_instance() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 5_000;

    let memory = PrivateMemory::<u64>::create(128).unwrap();
    let anchor = memory.retain().unwrap();

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let (anchor, memory) = (&anchor, &memory);
            scope.spawn(move || {
                for i in 0..ROUNDS {
                    let copy = anchor.clone_range(i % 128, 1).unwrap();
                    let pin = memory.pin(i % 128).unwrap();
                    drop(copy);
                    drop(pin);
                }
            });
        }
    });

    assert_eq!(memory.reference_count(), 1);
    drop(anchor);
    assert!(memory.is_disposed());
}

#[test]
fn test_racing_last_release_returns_once() {
    const THREADS: usize = 4;
    const ROUNDS: u64 = 2_000;

    let pool = RetainableMemoryPool::<u8>::private(
        PoolConfig::default()
            .with_min_buffer_length(64)
            .with_max_buffer_length(1024)
            .with_core_count(1),
    )
    .unwrap();

    for round in 0..ROUNDS {
        let memory = pool.rent_memory(64).unwrap();
        let barrier = Barrier::new(THREADS);

        // Counts pass through zero while other threads retain
        thread::scope(|scope| {
            for _ in 0..THREADS {
                let (barrier, memory) = (&barrier, &memory);
                scope.spawn(move || {
                    barrier.wait();
                    for _ in 0..4 {
                        if let Ok(view) = memory.retain() {
                            drop(view);
                        }
                    }
                });
            }
        });

        assert!(memory.is_pooled());
        assert_eq!(memory.reference_count(), 0);
        assert_eq!(pool.pooled_count(), 1);
        assert_eq!(pool.stats().returns, round + 1);
    }
}

#[test]
fn test_racing_last_release_frees_standalone_once() {
    const THREADS: usize = 4;

    for _ in 0..500 {
        let memory = PrivateMemory::<u32>::create(32).unwrap();
        let barrier = Barrier::new(THREADS);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                let (barrier, memory) = (&barrier, &memory);
                scope.spawn(move || {
                    barrier.wait();
                    for _ in 0..4 {
                        if let Ok(pin) = memory.pin(0) {
                            drop(pin);
                        }
                    }
                });
            }
        });

        assert!(memory.is_disposed());
        assert!(memory.core().is_freed());
        assert_eq!(memory.retain().err(), Some(MemoryError::Disposed));
    }
}

#[test]
fn test_shared_pool_returns_from_other_threads() {
    let pool = RetainableMemoryPool::<u32>::array(
        PoolConfig::default()
            .with_min_buffer_length(16)
            .with_max_buffer_length(1024)
            .with_max_buffers_per_core(64),
    )
    .unwrap();

    let rented: Vec<_> = (0..32).map(|_| pool.rent_memory(64).unwrap()).collect();
    let views: Vec<_> = rented.iter().map(|m| m.retain().unwrap()).collect();

    // Borrows released on other threads still reach the pool
    thread::scope(|scope| {
        for view in views {
            scope.spawn(move || drop(view));
        }
    });

    assert!(rented.iter().all(|m| m.reference_count() == 0));
    assert!(rented.iter().all(|m| m.is_pooled() || m.is_disposed()));
    assert!(pool.pooled_count() > 0);
}

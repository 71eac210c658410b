/*!
 * Atomic Counter Tests
 * Count transitions, flag packing and zero-transition callbacks
 */

use pinned_memory::memory::AtomicCounter;
use pinned_memory::CounterError;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_three_up_three_down_fires_once() {
    let counter = AtomicCounter::new();
    let fired = AtomicUsize::new(0);

    for expected in 1..=3 {
        assert_eq!(counter.increment(), Ok(expected));
    }
    assert_eq!(counter.count(), 3);

    let mut observed = Vec::new();
    for _ in 0..3 {
        let remaining = counter
            .decrement_with(|| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        observed.push((remaining, fired.load(Ordering::SeqCst)));
    }

    // Callback runs on the third decrement only
    assert_eq!(observed, vec![(2, 0), (1, 0), (0, 1)]);
    assert_eq!(counter.count(), 0);
}

#[test]
fn test_decrement_below_zero_fails() {
    let counter = AtomicCounter::new();
    assert_eq!(counter.decrement(), Err(CounterError::Underflow));
}

#[test]
fn test_disposed_counter_refuses_changes() {
    let counter = AtomicCounter::new();
    counter.try_dispose().unwrap();

    assert!(counter.is_disposed());
    assert_eq!(counter.increment(), Err(CounterError::Disposed));
    assert_eq!(counter.decrement(), Err(CounterError::Disposed));
    assert_eq!(counter.try_dispose(), Err(CounterError::Disposed));
}

#[test]
fn test_dispose_refused_while_retained() {
    let counter = AtomicCounter::new();
    counter.increment().unwrap();
    counter.increment().unwrap();
    assert_eq!(counter.try_dispose(), Err(CounterError::Retained(2)));
    assert!(!counter.is_disposed());
}

#[test]
fn test_force_clear_keeps_flags() {
    let counter = AtomicCounter::new();
    counter.increment().unwrap();
    counter.increment().unwrap();

    assert_eq!(counter.force_clear_count(), 2);
    assert_eq!(counter.count(), 0);

    counter.try_dispose_with(AtomicCounter::POOLED).unwrap();
    counter.force_clear_count();
    assert_eq!(
        counter.flags(),
        AtomicCounter::DISPOSED | AtomicCounter::POOLED
    );
}

#[test]
fn test_revive_requires_exact_flags() {
    let counter = AtomicCounter::new();
    counter.try_dispose_with(AtomicCounter::POOLED).unwrap();
    assert!(counter.is_pooled());

    assert!(!counter.try_revive(0));
    assert!(counter.try_revive(AtomicCounter::POOLED));
    assert_eq!(counter.raw(), 0);
}

#[test]
fn test_concurrent_increments_balance() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 10_000;

    let counter = Arc::new(AtomicCounter::new());
    let zero_hits = Arc::new(AtomicUsize::new(0));

    // Holder reference keeps the count above zero during the race
    counter.increment().unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let zero_hits = Arc::clone(&zero_hits);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    counter.increment().unwrap();
                    counter
                        .decrement_with(|| {
                            zero_hits.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(counter.count(), 1);
    assert_eq!(zero_hits.load(Ordering::SeqCst), 0);

    counter
        .decrement_with(|| {
            zero_hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(zero_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_net_count() {
    let counter = Arc::new(AtomicCounter::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..(1000 * (i + 1)) {
                    counter.increment().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.count(), 1000 + 2000 + 3000 + 4000);
}

/*!
 * Atomic Reference Counter
 *
 * Packed 32-bit word holding a reference count and lifecycle flags.
 *
 * # Layout
 *
 * ```text
 *  31        30       29..24     23..0
 * [DISPOSED][POOLED][reserved][  count  ]
 * ```
 *
 * Every transition is a single compare-and-swap on the whole word, so the
 * count and the flags never disagree.
 */

use crate::core::hints::unlikely;
use crate::core::limits::MAX_REFERENCE_COUNT;
use crate::core::CounterError;
use crossbeam_utils::Backoff;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Lock-free reference counter with a disposed state
///
/// # States
///
/// - live: `DISPOSED` clear, count >= 0
/// - disposed: `DISPOSED` set, count == 0; inert until revived
///
/// Disposed counters reject every increment and decrement.
pub struct AtomicCounter {
    word: AtomicU32,
}

impl AtomicCounter {
    /// Bits holding the reference count
    pub const COUNT_MASK: u32 = MAX_REFERENCE_COUNT;

    /// Bits holding lifecycle flags
    pub const FLAGS_MASK: u32 = !Self::COUNT_MASK;

    /// Counter is disposed
    pub const DISPOSED: u32 = 1 << 31;

    /// Owner currently sits in a pool bucket
    pub const POOLED: u32 = 1 << 30;

    /// Create a live counter with count 0
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
        }
    }

    /// Create a counter already in the disposed state
    pub const fn new_disposed() -> Self {
        Self {
            word: AtomicU32::new(Self::DISPOSED),
        }
    }

    #[inline(always)]
    fn load(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }

    /// Raw packed word
    #[inline]
    pub fn raw(&self) -> u32 {
        self.load()
    }

    /// Current reference count
    #[inline]
    pub fn count(&self) -> u32 {
        self.load() & Self::COUNT_MASK
    }

    /// Current flag bits
    #[inline]
    pub fn flags(&self) -> u32 {
        self.load() & Self::FLAGS_MASK
    }

    /// Whether the counter is disposed
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.load() & Self::DISPOSED != 0
    }

    /// Whether the owner sits in a pool
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.load() & Self::POOLED != 0
    }

    /// Whether there are outstanding references
    #[inline]
    pub fn is_retained(&self) -> bool {
        self.count() > 0
    }

    /// Run a CAS loop applying `step` to the current word
    #[inline]
    fn update(
        &self,
        mut step: impl FnMut(u32) -> Result<u32, CounterError>,
    ) -> Result<u32, CounterError> {
        let backoff = Backoff::new();
        let mut current = self.load();
        loop {
            let next = step(current)?;
            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next),
                Err(actual) => {
                    current = actual;
                    backoff.spin();
                }
            }
        }
    }

    /// Add one reference, returning the new count
    #[inline]
    pub fn increment(&self) -> Result<u32, CounterError> {
        self.update(|word| {
            if unlikely(word & Self::DISPOSED != 0) {
                return Err(CounterError::Disposed);
            }
            if unlikely(word & Self::COUNT_MASK == Self::COUNT_MASK) {
                return Err(CounterError::Overflow);
            }
            Ok(word + 1)
        })
        .map(|word| word & Self::COUNT_MASK)
    }

    /// Drop one reference, returning the new count
    ///
    /// Exactly one caller observes the transition to zero.
    #[inline]
    pub fn decrement(&self) -> Result<u32, CounterError> {
        self.update(|word| {
            if unlikely(word & Self::DISPOSED != 0) {
                return Err(CounterError::Disposed);
            }
            if unlikely(word & Self::COUNT_MASK == 0) {
                return Err(CounterError::Underflow);
            }
            Ok(word - 1)
        })
        .map(|word| word & Self::COUNT_MASK)
    }

    /// Drop one reference and run `on_zero` if it was the last one
    #[inline]
    pub fn decrement_with(&self, on_zero: impl FnOnce()) -> Result<u32, CounterError> {
        let remaining = self.decrement()?;
        if remaining == 0 {
            on_zero();
        }
        Ok(remaining)
    }

    /// Drop one reference, disposing the counter in the same step when it was the last
    ///
    /// `Ok(0)` hands the caller sole ownership of the zero transition: no
    /// increment can succeed in between, so exactly one caller runs the
    /// teardown for it.
    #[inline]
    pub fn decrement_and_dispose(&self) -> Result<u32, CounterError> {
        self.update(|word| {
            if unlikely(word & Self::DISPOSED != 0) {
                return Err(CounterError::Disposed);
            }
            match word & Self::COUNT_MASK {
                0 => Err(CounterError::Underflow),
                1 => Ok((word - 1) | Self::DISPOSED),
                _ => Ok(word - 1),
            }
        })
        .map(|word| word & Self::COUNT_MASK)
    }

    /// Move a live counter with count 0 into the disposed state
    pub fn try_dispose(&self) -> Result<(), CounterError> {
        self.try_dispose_with(0)
    }

    /// Move a live counter with count 0 into the disposed state, setting `flags`
    pub fn try_dispose_with(&self, flags: u32) -> Result<(), CounterError> {
        debug_assert_eq!(flags & Self::COUNT_MASK, 0, "flags overlap count bits");
        self.update(|word| {
            if word & Self::DISPOSED != 0 {
                return Err(CounterError::Disposed);
            }
            let count = word & Self::COUNT_MASK;
            if count != 0 {
                return Err(CounterError::Retained(count));
            }
            Ok(word | Self::DISPOSED | flags)
        })
        .map(|_| ())
    }

    /// Bring a disposed counter carrying exactly `expected_flags` back to live, count 0
    ///
    /// Returns false when the word did not match.
    pub fn try_revive(&self, expected_flags: u32) -> bool {
        let expected = Self::DISPOSED | expected_flags;
        self.word
            .compare_exchange(expected, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Set `flags` while keeping everything else
    pub fn set_flags(&self, flags: u32) {
        debug_assert_eq!(flags & Self::COUNT_MASK, 0, "flags overlap count bits");
        self.word.fetch_or(flags, Ordering::AcqRel);
    }

    /// Clear `flags` while keeping everything else
    pub fn clear_flags(&self, flags: u32) {
        debug_assert_eq!(flags & Self::COUNT_MASK, 0, "flags overlap count bits");
        self.word.fetch_and(!flags, Ordering::AcqRel);
    }

    /// Zero the count bits, preserving every flag bit
    ///
    /// Only for teardown of instances known to have no live borrowers.
    /// Returns the count that was discarded.
    pub fn force_clear_count(&self) -> u32 {
        self.word.fetch_and(Self::FLAGS_MASK, Ordering::AcqRel) & Self::COUNT_MASK
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = self.load();
        f.debug_struct("AtomicCounter")
            .field("count", &(word & Self::COUNT_MASK))
            .field("disposed", &(word & Self::DISPOSED != 0))
            .field("pooled", &(word & Self::POOLED != 0))
            .finish()
    }
}

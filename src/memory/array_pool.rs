/*!
 * Shared Array Pool
 * Recycles managed arrays by power-of-two size class
 */

use super::element::Element;
use crate::core::limits::{ARRAY_POOL_ARRAYS_PER_CLASS, ARRAY_POOL_MAX_LENGTH, ARRAY_POOL_MIN_LENGTH};
use crate::core::type_slot;
use crossbeam_queue::ArrayQueue;

/// Process-wide pool of `Vec<T>` arrays
///
/// One instance exists per element type (see [`ArrayPool::shared`]). Every
/// size class holds a bounded lock-free queue; a full queue drops the array.
///
/// # Performance
///
/// - **Rent/release**: one `ArrayQueue` pop/push, no locks
/// - **Miss**: plain allocation of the class length
///
/// # Example
///
/// ```ignore
/// let pool = ArrayPool::<u64>::shared();
/// let array = pool.rent(100);   // len() == 128
/// pool.release(array, false);
/// ```
pub struct ArrayPool<T: Element> {
    classes: Box<[ArrayQueue<Vec<T>>]>,
    min_length: usize,
    max_length: usize,
}

impl<T: Element> ArrayPool<T> {
    /// Create a private pool
    pub fn new(min_length: usize, max_length: usize, arrays_per_class: usize) -> Self {
        let min_length = min_length.max(1).next_power_of_two();
        let max_length = max_length.max(min_length).next_power_of_two();
        let class_count = (max_length.trailing_zeros() - min_length.trailing_zeros()) as usize + 1;
        let classes = (0..class_count)
            .map(|_| ArrayQueue::new(arrays_per_class.max(1)))
            .collect();

        Self {
            classes,
            min_length,
            max_length,
        }
    }

    /// Pool shared by every user of `T`
    pub fn shared() -> &'static Self {
        type_slot::<ArrayPool<T>, ArrayPool<T>>(|| {
            Self::new(
                ARRAY_POOL_MIN_LENGTH,
                ARRAY_POOL_MAX_LENGTH,
                ARRAY_POOL_ARRAYS_PER_CLASS,
            )
        })
    }

    /// Largest pooled array length
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn class_of(&self, length: usize) -> Option<usize> {
        if length > self.max_length {
            return None;
        }
        let rounded = length.max(self.min_length).next_power_of_two();
        Some((rounded.trailing_zeros() - self.min_length.trailing_zeros()) as usize)
    }

    fn class_length(&self, class: usize) -> usize {
        self.min_length << class
    }

    /// Rent an array of at least `min_length` elements, all `Default`
    ///
    /// Requests above the largest class get an exact-size array.
    pub fn rent(&self, min_length: usize) -> Vec<T> {
        let Some(class) = self.class_of(min_length) else {
            return std::iter::repeat_with(T::default).take(min_length).collect();
        };

        match self.classes[class].pop() {
            Some(array) => array,
            None => std::iter::repeat_with(T::default)
                .take(self.class_length(class))
                .collect(),
        }
    }

    /// Return an array
    ///
    /// Elements are reset when `clear` is set and always for non-blittable
    /// types. Arrays whose length is not a pooled class length are dropped.
    pub fn release(&self, mut array: Vec<T>, clear: bool) {
        let length = array.len();
        let Some(class) = self.class_of(length) else {
            return;
        };
        if self.class_length(class) != length {
            return;
        }

        if clear || !T::BLITTABLE {
            array.iter_mut().for_each(|item| *item = T::default());
        }
        let _ = self.classes[class].push(array); // Drop if full
    }

    /// Arrays currently held in the class serving `length`
    pub fn pooled_count(&self, length: usize) -> usize {
        self.class_of(length)
            .map(|class| self.classes[class].len())
            .unwrap_or(0)
    }
}

impl<T: Element> std::fmt::Debug for ArrayPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayPool")
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("classes", &self.classes.len())
            .finish()
    }
}

/*!
 * Pool Buckets
 *
 * One bucket per power-of-two size class, each holding a bounded stack per
 * logical core. Stacks are cache-padded so neighbouring cores never share a
 * line.
 */

use crate::memory::element::Element;
use crate::memory::retainable::SharedMemory;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

/// `ceil(log2(n))`, with `ceil_log2(0) == ceil_log2(1) == 0`
#[inline]
pub(crate) fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Bucket index of `length` for a power-of-two `min_length`
#[inline]
pub(crate) fn bucket_index(length: usize, min_length: usize) -> usize {
    debug_assert!(min_length.is_power_of_two());
    let index = ceil_log2(length).saturating_sub(min_length.trailing_zeros()) as usize;
    debug_assert_eq!(
        index,
        bucket_index_bitwise(length, min_length),
        "bucket index disagreement for length {}",
        length
    );
    index
}

/// Bit-trick counterpart of [`bucket_index`]
#[inline]
pub(crate) fn bucket_index_bitwise(length: usize, min_length: usize) -> usize {
    let folded = (length.max(1) - 1) | (min_length - 1);
    if folded == 0 {
        return 0;
    }
    let highest = usize::BITS - 1 - folded.leading_zeros();
    (highest + 1 - min_length.trailing_zeros()) as usize
}

/// Outcome of a pop attempt
pub(crate) enum Pop<T: Element> {
    Hit(SharedMemory<T>),
    Empty,
    Contended,
}

/// Per-size-class store of pooled instances
pub(crate) struct Bucket<T: Element> {
    size: usize,
    depth: usize,
    stacks: Box<[CachePadded<Mutex<Vec<SharedMemory<T>>>>]>,
}

impl<T: Element> Bucket<T> {
    pub(crate) fn new(size: usize, cores: usize, depth: usize) -> Self {
        let stacks = (0..cores.max(1))
            .map(|_| CachePadded::new(Mutex::new(Vec::with_capacity(depth))))
            .collect();
        Self { size, depth, stacks }
    }

    /// Element length of every instance in this bucket
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn stack(&self, core: usize) -> &Mutex<Vec<SharedMemory<T>>> {
        &self.stacks[core % self.stacks.len()]
    }

    /// Pop from `core`'s stack without waiting
    #[inline]
    pub(crate) fn try_pop(&self, core: usize) -> Pop<T> {
        match self.stack(core).try_lock() {
            Some(mut stack) => stack.pop().map_or(Pop::Empty, Pop::Hit),
            None => Pop::Contended,
        }
    }

    /// Push onto `core`'s stack; hands the instance back when the stack is full
    ///
    /// The second value reports whether the lock was contended.
    pub(crate) fn push(
        &self,
        core: usize,
        memory: SharedMemory<T>,
    ) -> (Result<(), SharedMemory<T>>, bool) {
        let stack = self.stack(core);
        let (mut guard, contended) = match stack.try_lock() {
            Some(guard) => (guard, false),
            None => (stack.lock(), true),
        };
        if guard.len() >= self.depth {
            return (Err(memory), contended);
        }
        guard.push(memory);
        (Ok(()), contended)
    }

    /// Remove every pooled instance
    pub(crate) fn drain(&self) -> Vec<SharedMemory<T>> {
        self.stacks
            .iter()
            .flat_map(|stack| std::mem::take(&mut *stack.lock()))
            .collect()
    }

    /// Instances currently pooled
    pub(crate) fn len(&self) -> usize {
        self.stacks.iter().map(|stack| stack.lock().len()).sum()
    }
}

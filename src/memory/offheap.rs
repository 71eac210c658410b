/*!
 * Off-Heap Memory
 *
 * Growable native buffers, a bounded pool of them, and retainable memory
 * wrapping one buffer.
 *
 * # Growth
 *
 * Buffers grow only on request (`ensure_capacity`), doubling their
 * capacity until the request fits. Growth reallocates, so it is refused
 * while the wrapping memory is retained.
 */

use super::allocator::{self, NativeBlock};
use super::element::{byte_length, Element};
use super::object_pool::ObjectPool;
use super::private::PrivateMemory;
use super::retainable::{counter_error, MemoryCore, MemoryKind, RetainableMemory, SharedMemory};
use crate::core::limits::{OFFHEAP_POOL_CAPACITY, OFFHEAP_POOL_MAX_LENGTH};
use crate::core::{MemoryError, MemoryResult};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

// ============================================================================
// OffHeapBuffer
// ============================================================================

/// Owned native buffer of blittable `T`
pub struct OffHeapBuffer<T: Element> {
    block: NativeBlock,
    capacity: usize,
    _marker: PhantomData<T>,
}

// The block is exclusively owned
unsafe impl<T: Element> Send for OffHeapBuffer<T> {}
unsafe impl<T: Element> Sync for OffHeapBuffer<T> {}

impl<T: Element> OffHeapBuffer<T> {
    /// Zero-filled buffer of at least `min_length` elements
    pub fn new(min_length: usize) -> MemoryResult<Self> {
        if !T::BLITTABLE {
            return Err(MemoryError::NotBlittable(std::any::type_name::<T>()));
        }
        let bytes = byte_length::<T>(min_length.max(1))?;
        let block = allocator::allocate_zeroed(bytes, PrivateMemory::<T>::native_alignment())?;
        Ok(Self {
            block,
            capacity: block.size / std::mem::size_of::<T>(),
            _marker: PhantomData,
        })
    }

    /// Elements available
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// First element
    #[inline]
    pub fn as_ptr(&self) -> NonNull<T> {
        self.block.ptr.cast()
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.as_ptr().as_ptr(), self.capacity) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr().as_ptr(), self.capacity) }
    }

    /// Grow to at least `min_length` elements, doubling
    ///
    /// Existing contents are preserved; the new tail is zeroed. Returns
    /// whether the buffer moved.
    pub fn ensure_capacity(&mut self, min_length: usize) -> MemoryResult<bool> {
        if min_length <= self.capacity {
            return Ok(false);
        }

        let mut target = self.capacity.max(1);
        while target < min_length {
            target = target.checked_mul(2).ok_or(MemoryError::SizeOverflow {
                length: min_length,
                element_size: std::mem::size_of::<T>(),
            })?;
        }

        let mut grown = Self::new(target)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.block.ptr.as_ptr(),
                grown.block.ptr.as_ptr(),
                self.block.size,
            );
        }
        std::mem::swap(self, &mut grown);
        tracing::debug!(
            from = grown.capacity,
            to = self.capacity,
            "Off-heap buffer grown"
        );
        Ok(true)
    }
}

impl<T: Element> Drop for OffHeapBuffer<T> {
    fn drop(&mut self) {
        unsafe { allocator::free(self.block) }
    }
}

impl<T: Element> std::fmt::Debug for OffHeapBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffHeapBuffer")
            .field("capacity", &self.capacity)
            .field("ptr", &self.block.ptr)
            .finish()
    }
}

// ============================================================================
// OffHeapBufferPool
// ============================================================================

/// Bounded pool of off-heap buffers
pub struct OffHeapBufferPool<T: Element> {
    buffers: ArrayQueue<OffHeapBuffer<T>>,
    max_length: usize,
}

impl<T: Element> OffHeapBufferPool<T> {
    /// Pool holding up to `capacity` buffers of at most `max_length` elements
    pub fn new(capacity: usize, max_length: usize) -> Arc<Self> {
        Arc::new(Self {
            buffers: ArrayQueue::new(capacity.max(1)),
            max_length,
        })
    }

    /// Pool with default bounds
    pub fn with_defaults() -> Arc<Self> {
        Self::new(OFFHEAP_POOL_CAPACITY, OFFHEAP_POOL_MAX_LENGTH)
    }

    /// Take a pooled buffer grown to `min_length`, or allocate one
    pub fn rent(&self, min_length: usize) -> MemoryResult<OffHeapBuffer<T>> {
        match self.buffers.pop() {
            Some(mut buffer) => {
                buffer.ensure_capacity(min_length)?;
                Ok(buffer)
            }
            None => OffHeapBuffer::new(min_length),
        }
    }

    /// Keep `buffer` for reuse; oversized buffers and overflow are dropped
    pub fn give_back(&self, buffer: OffHeapBuffer<T>) -> bool {
        if buffer.capacity() > self.max_length {
            return false;
        }
        self.buffers.push(buffer).is_ok()
    }

    /// Buffers currently pooled
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

// ============================================================================
// OffHeapMemory
// ============================================================================

struct OffHeapState<T: Element> {
    buffer: Option<OffHeapBuffer<T>>,
    pool: Option<Arc<OffHeapBufferPool<T>>>,
}

/// Retainable memory over one [`OffHeapBuffer`]
pub struct OffHeapMemory<T: Element> {
    core: MemoryCore<T>,
    state: Mutex<OffHeapState<T>>,
}

impl<T: Element> OffHeapMemory<T> {
    fn empty() -> Self {
        Self {
            core: MemoryCore::new(),
            state: Mutex::new(OffHeapState {
                buffer: None,
                pool: None,
            }),
        }
    }

    /// Memory over a buffer of at least `min_length` elements
    ///
    /// With a buffer pool the buffer is rented from it and given back on free.
    /// The length is the buffer capacity.
    pub fn create(
        min_length: usize,
        buffer_pool: Option<Arc<OffHeapBufferPool<T>>>,
    ) -> MemoryResult<Arc<Self>> {
        let buffer = match &buffer_pool {
            Some(pool) => pool.rent(min_length)?,
            None => OffHeapBuffer::new(min_length)?,
        };

        let memory = ObjectPool::<Self>::shared()
            .rent()
            .unwrap_or_else(|| Arc::new(Self::empty()));

        let (base, capacity) = (buffer.as_ptr(), buffer.capacity());
        {
            let mut state = memory.state.lock();
            state.buffer = Some(buffer);
            state.pool = buffer_pool;
        }
        memory.core.init(base, 0, capacity, capacity);
        Ok(memory)
    }

    /// Grow the buffer to at least `min_length` elements
    ///
    /// Fails with `Retained` while any borrow is outstanding. Concurrent
    /// retains during growth fail with `Disposed`.
    pub fn ensure_capacity(&self, min_length: usize) -> MemoryResult<()> {
        if min_length <= self.core.capacity() {
            return Ok(());
        }

        // Park the counter so no borrow can start while the buffer moves
        let counter = self.core.counter();
        counter.try_dispose().map_err(counter_error)?;

        let result = {
            let mut state = self.state.lock();
            match state.buffer.as_mut() {
                Some(buffer) => buffer.ensure_capacity(min_length).map(|_| {
                    self.core
                        .rebase(buffer.as_ptr(), buffer.capacity(), buffer.capacity());
                }),
                None => Err(MemoryError::Disposed),
            }
        };

        let revived = counter.try_revive(0);
        debug_assert!(revived, "counter changed while parked: {:?}", counter);
        result
    }

    /// Whether a buffer pool receives the buffer on free
    pub fn has_buffer_pool(&self) -> bool {
        self.state.lock().pool.is_some()
    }
}

impl<T: Element> RetainableMemory<T> for OffHeapMemory<T> {
    fn core(&self) -> &MemoryCore<T> {
        &self.core
    }

    fn kind(&self) -> MemoryKind {
        MemoryKind::OffHeap
    }

    fn is_array_backed(&self) -> bool {
        false
    }

    fn free_backing(&self, disposing: bool) {
        let (buffer, pool) = {
            let mut state = self.state.lock();
            (state.buffer.take(), state.pool.take())
        };
        if let (Some(buffer), Some(pool), true) = (buffer, pool, disposing) {
            pool.give_back(buffer);
        }
    }

    fn into_shared(self: Arc<Self>) -> SharedMemory<T> {
        self
    }

    fn recycle(self: Arc<Self>) {
        ObjectPool::<Self>::shared().give_back(self);
    }
}

impl<T: Element> Drop for OffHeapMemory<T> {
    fn drop(&mut self) {
        if self.core.finalize(MemoryKind::OffHeap) {
            self.free_backing(false);
        }
    }
}

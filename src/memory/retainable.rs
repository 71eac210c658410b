/*!
 * Retainable Memory
 *
 * Base abstraction for pinned, reference-counted memory: the shared state
 * every kind carries ([`MemoryCore`]), the per-kind hooks
 * ([`RetainableMemory`]) and the retain/release protocol.
 *
 * # Lifecycle
 *
 * ```text
 * Uninitialized --init--> Live(0) --retain--> Live(k+1) --release--> Live(k)
 * Live(0) --last release / dispose--> Pooled | Freed
 * Pooled --rent--> Live(0)
 * ```
 *
 * `Freed` is terminal for the instance; its shell may be recycled only when
 * no other strong reference to it exists.
 */

use super::counter::AtomicCounter;
use super::element::Element;
use super::pool::{PoolId, RetainableMemoryPool};
use super::retained::RetainedMemory;
use crate::core::hints::unlikely;
use crate::core::{CounterError, MemoryError, MemoryResult};
use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Type-erased handle to any memory kind
pub type SharedMemory<T> = Arc<dyn RetainableMemory<T>>;

/// Backing strategy of a memory instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemoryKind {
    /// Pooled managed array
    Array,
    /// Native aligned memory, or a managed array for non-blittable types
    Private,
    /// Growable native buffer from an off-heap buffer pool
    OffHeap,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryKind::Array => write!(f, "ARRAY"),
            MemoryKind::Private => write!(f, "PRIVATE"),
            MemoryKind::OffHeap => write!(f, "OFFHEAP"),
        }
    }
}

/// Back-link from an instance to the pool that owns its identity
pub(crate) struct PoolLink<T: Element> {
    pub(crate) id: PoolId,
    pub(crate) pool: Weak<RetainableMemoryPool<T>>,
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared by every memory kind
///
/// Fields other than the counter change only while the instance is
/// unreachable by borrowers (uninitialized, pooled, or being freed). The
/// counter's acquire/release transitions order those writes against readers.
pub struct MemoryCore<T: Element> {
    counter: AtomicCounter,
    base: AtomicPtr<T>,
    offset: AtomicUsize,
    length: AtomicUsize,
    capacity: AtomicUsize,
    freed: AtomicBool,
    pool: ArcSwapOption<PoolLink<T>>,
}

impl<T: Element> MemoryCore<T> {
    /// Uninitialized core (counter disposed, no storage)
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicCounter::new_disposed(),
            base: AtomicPtr::new(std::ptr::null_mut()),
            offset: AtomicUsize::new(0),
            length: AtomicUsize::new(0),
            capacity: AtomicUsize::new(0),
            freed: AtomicBool::new(true),
            pool: ArcSwapOption::empty(),
        }
    }

    /// Attach storage and bring the counter live at zero
    ///
    /// `capacity` counts elements available from `base + offset`.
    pub(crate) fn init(&self, base: NonNull<T>, offset: usize, length: usize, capacity: usize) {
        debug_assert!(length <= capacity, "length {} > capacity {}", length, capacity);
        self.base.store(base.as_ptr(), Ordering::Relaxed);
        self.offset.store(offset, Ordering::Relaxed);
        self.length.store(length, Ordering::Relaxed);
        self.capacity.store(capacity, Ordering::Relaxed);
        self.freed.store(false, Ordering::Relaxed);

        let revived = self.counter.try_revive(0);
        debug_assert!(revived, "init on a live counter: {:?}", self.counter);
    }

    /// Replace storage of a live, unretained instance
    pub(crate) fn rebase(&self, base: NonNull<T>, length: usize, capacity: usize) {
        debug_assert!(!self.counter.is_retained());
        self.base.store(base.as_ptr(), Ordering::Release);
        self.offset.store(0, Ordering::Release);
        self.length.store(length, Ordering::Release);
        self.capacity.store(capacity, Ordering::Release);
    }

    /// Reference counter
    #[inline]
    pub fn counter(&self) -> &AtomicCounter {
        &self.counter
    }

    /// Logical length in elements
    #[inline]
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Acquire)
    }

    /// Element offset of the data start inside the backing storage
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// Elements available from the data start
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// First element of the data range (null when uninitialized)
    #[inline]
    pub(crate) fn data_ptr(&self) -> *mut T {
        let base = self.base.load(Ordering::Acquire);
        if base.is_null() {
            return base;
        }
        unsafe { base.add(self.offset()) }
    }

    /// Whether the backing has been released
    #[inline]
    pub fn is_freed(&self) -> bool {
        self.freed.load(Ordering::Acquire)
    }

    /// Mark the backing as released; true for the single caller that wins
    pub(crate) fn mark_freed(&self) -> bool {
        let won = !self.freed.swap(true, Ordering::AcqRel);
        if won {
            self.base.store(std::ptr::null_mut(), Ordering::Release);
            self.length.store(0, Ordering::Release);
            self.capacity.store(0, Ordering::Release);
            self.offset.store(0, Ordering::Release);
        }
        won
    }

    pub(crate) fn attach_pool(&self, id: PoolId, pool: Weak<RetainableMemoryPool<T>>) {
        self.pool.store(Some(Arc::new(PoolLink { id, pool })));
    }

    pub(crate) fn detach_pool(&self) {
        self.pool.store(None);
    }

    /// Id of the owning pool, if any
    pub fn pool_id(&self) -> Option<PoolId> {
        self.pool.load().as_ref().map(|link| link.id)
    }

    /// Owning pool, if attached and still alive
    pub(crate) fn pool(&self) -> Option<Arc<RetainableMemoryPool<T>>> {
        self.pool.load().as_ref().and_then(|link| link.pool.upgrade())
    }

    /// Reset every element of the capacity range
    ///
    /// Blittable storage is zeroed; other element types are reset to
    /// `Default`, dropping the previous values.
    ///
    /// # Safety
    ///
    /// The caller has exclusive access: no borrows exist and no other thread
    /// can reach the storage.
    pub(crate) unsafe fn clear_storage(&self) {
        let data = self.data_ptr();
        if data.is_null() {
            return;
        }
        let capacity = self.capacity();
        if T::BLITTABLE {
            std::ptr::write_bytes(data, 0, capacity);
        } else {
            for index in 0..capacity {
                *data.add(index) = T::default();
            }
        }
    }

    /// Drop-path check shared by every kind; true when the caller must free
    pub(crate) fn finalize(&self, kind: MemoryKind) -> bool {
        let count = self.counter.count();
        if unlikely(count > 0 && !self.counter.is_disposed()) {
            log::error!(
                "{} memory finalized while retained by {} references",
                kind,
                count
            );
            if cfg!(debug_assertions) && !std::thread::panicking() {
                panic!("{} memory finalized while retained by {} references", kind, count);
            }
        }
        self.detach_pool();
        self.mark_freed()
    }
}

impl<T: Element> fmt::Debug for MemoryCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCore")
            .field("counter", &self.counter)
            .field("offset", &self.offset())
            .field("length", &self.length())
            .field("capacity", &self.capacity())
            .field("freed", &self.is_freed())
            .field("pool", &self.pool_id())
            .finish()
    }
}

// ============================================================================
// RetainableMemory Trait
// ============================================================================

/// Pinned, reference-counted memory of `T` elements
///
/// Implementors supply the backing strategy; the retain/release protocol and
/// pool interaction live in this module and in [`MemoryExt`].
pub trait RetainableMemory<T: Element>: Send + Sync + 'static {
    /// Shared state
    fn core(&self) -> &MemoryCore<T>;

    /// Backing strategy
    fn kind(&self) -> MemoryKind;

    /// Whether elements live in a managed array rather than native memory
    fn is_array_backed(&self) -> bool;

    /// Release the backing storage
    ///
    /// Called at most once per initialization. `disposing` is false on the
    /// drop path, where no pool interaction may happen.
    fn free_backing(&self, disposing: bool);

    /// Erase the concrete type
    fn into_shared(self: Arc<Self>) -> SharedMemory<T>;

    /// Offer a freed, otherwise unreferenced instance for shell reuse
    fn recycle(self: Arc<Self>) {}

    /// Logical length in elements
    fn length(&self) -> usize {
        self.core().length()
    }

    /// Elements physically available
    fn capacity(&self) -> usize {
        self.core().capacity()
    }

    /// Outstanding references (retains and pins)
    fn reference_count(&self) -> u32 {
        self.core().counter().count()
    }

    /// Whether any reference is outstanding
    fn is_retained(&self) -> bool {
        self.core().counter().is_retained()
    }

    /// Whether the instance is pooled or freed
    fn is_disposed(&self) -> bool {
        self.core().counter().is_disposed()
    }

    /// Whether the instance sits in a pool bucket
    fn is_pooled(&self) -> bool {
        self.core().counter().is_pooled()
    }

    /// Owning pool id
    fn pool_id(&self) -> Option<PoolId> {
        self.core().pool_id()
    }

    /// Stable pointer to the first element
    ///
    /// Only blittable element types expose a pointer.
    fn pointer(&self) -> Option<NonNull<T>> {
        if !T::BLITTABLE || self.is_disposed() {
            return None;
        }
        NonNull::new(self.core().data_ptr())
    }

    /// Direct view over `[data, data + length)`
    ///
    /// # Safety
    ///
    /// The caller holds a retain (or pin) for as long as the slice is used
    /// and does not create overlapping mutable views.
    #[allow(clippy::mut_from_ref)]
    unsafe fn get_span(&self) -> MemoryResult<&mut [T]> {
        let core = self.core();
        if core.counter().is_disposed() {
            return Err(MemoryError::Disposed);
        }
        let data = core.data_ptr();
        if data.is_null() {
            return Ok(&mut []);
        }
        Ok(std::slice::from_raw_parts_mut(data, core.length()))
    }
}

// ============================================================================
// Retain / Release Protocol
// ============================================================================

/// Map counter failures onto the public error surface
pub(crate) fn counter_error(err: CounterError) -> MemoryError {
    match err {
        CounterError::Disposed => MemoryError::Disposed,
        CounterError::Retained(count) => MemoryError::Retained { count },
        other => MemoryError::Counter(other),
    }
}

/// Fail fast on a broken ownership contract detected where no error can be returned
#[cold]
pub(crate) fn contract_violation(args: fmt::Arguments<'_>) {
    if std::thread::panicking() {
        log::error!("memory contract violation during unwind: {}", args);
    } else {
        panic!("memory contract violation: {}", args);
    }
}

/// Drop one counted reference held through `owner`
pub(crate) fn release<T: Element>(owner: SharedMemory<T>) {
    match owner.core().counter().decrement_and_dispose() {
        Ok(0) => on_no_references(owner),
        Ok(_) => {}
        Err(err) => contract_violation(format_args!(
            "release on {} memory failed: {}",
            owner.kind(),
            err
        )),
    }
}

/// Claim a live, unretained instance for teardown
///
/// On success the counter is disposed and the caller owns the instance.
pub(crate) fn claim<T: Element>(owner: &SharedMemory<T>) -> MemoryResult<()> {
    let counter = owner.core().counter();
    match counter.try_dispose() {
        Ok(()) => Ok(()),
        Err(CounterError::Disposed) if counter.is_pooled() => Err(MemoryError::AlreadyPooled),
        Err(err) => Err(counter_error(err)),
    }
}

/// Last reference gone: return to the pool or free
///
/// The caller has claimed the instance (its counter is disposed by the
/// caller's own transition).
pub(crate) fn on_no_references<T: Element>(owner: SharedMemory<T>) {
    if let Some(pool) = owner.core().pool() {
        match pool.return_claimed(&owner, false) {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => contract_violation(format_args!("pool return failed: {}", err)),
        }
    }
    free(owner, true);
}

/// Release the backing of an unretained instance
pub(crate) fn free<T: Element>(owner: SharedMemory<T>, disposing: bool) {
    let core = owner.core();
    match core.counter().try_dispose() {
        Ok(()) | Err(CounterError::Disposed) => {}
        Err(CounterError::Retained(_)) => return,
        Err(err) => {
            contract_violation(format_args!("free failed: {}", err));
            return;
        }
    }
    if core.counter().is_pooled() {
        return;
    }

    core.detach_pool();
    if core.mark_freed() {
        owner.free_backing(disposing);
    }

    if Arc::strong_count(&owner) == 1 {
        owner.recycle();
    }
}

/// Operations on any `Arc` of a memory kind
pub trait MemoryExt<T: Element> {
    /// Type-erased clone of the handle
    fn shared(&self) -> SharedMemory<T>;

    /// Borrow the whole logical range
    fn retain(&self) -> MemoryResult<RetainedMemory<T>>;

    /// Borrow `[0, length)`
    fn retain_len(&self, length: usize) -> MemoryResult<RetainedMemory<T>>;

    /// Borrow `[start, start + length)`
    fn retain_range(&self, start: usize, length: usize) -> MemoryResult<RetainedMemory<T>>;

    /// Pin element `index`; the handle counts as a borrow until dropped
    fn pin(&self, index: usize) -> MemoryResult<PinnedHandle<T>>;

    /// Return to the pool or free, refusing while retained
    fn dispose(&self) -> MemoryResult<()>;
}

impl<T: Element, M: RetainableMemory<T> + ?Sized> MemoryExt<T> for Arc<M> {
    fn shared(&self) -> SharedMemory<T> {
        Arc::clone(self).into_shared()
    }

    fn retain(&self) -> MemoryResult<RetainedMemory<T>> {
        self.retain_range(0, self.length())
    }

    fn retain_len(&self, length: usize) -> MemoryResult<RetainedMemory<T>> {
        self.retain_range(0, length)
    }

    fn retain_range(&self, start: usize, length: usize) -> MemoryResult<RetainedMemory<T>> {
        let core = self.core();
        core.counter().increment().map_err(counter_error)?;

        let bound = core.length();
        if unlikely(start.checked_add(length).map_or(true, |end| end > bound)) {
            release(self.shared());
            return Err(MemoryError::out_of_range(start, length, bound));
        }
        Ok(RetainedMemory::from_owner(self.shared(), start, length))
    }

    fn pin(&self, index: usize) -> MemoryResult<PinnedHandle<T>> {
        let core = self.core();
        core.counter().increment().map_err(counter_error)?;

        let bound = core.length();
        let data = core.data_ptr();
        if unlikely(index >= bound || data.is_null()) {
            release(self.shared());
            return Err(MemoryError::out_of_range(index, 1, bound));
        }
        let ptr = unsafe { NonNull::new_unchecked(data.add(index)) };
        Ok(PinnedHandle {
            owner: Some(self.shared()),
            ptr,
        })
    }

    fn dispose(&self) -> MemoryResult<()> {
        let owner = self.shared();
        claim(&owner)?;
        on_no_references(owner);
        Ok(())
    }
}

// ============================================================================
// Pin Handle
// ============================================================================

/// A pinned element; unpins on drop
pub struct PinnedHandle<T: Element> {
    owner: Option<SharedMemory<T>>,
    ptr: NonNull<T>,
}

// The handle holds a counted reference; the pointer stays valid until drop
unsafe impl<T: Element> Send for PinnedHandle<T> {}
unsafe impl<T: Element> Sync for PinnedHandle<T> {}

impl<T: Element> PinnedHandle<T> {
    /// Address of the pinned element
    #[inline]
    pub fn pointer(&self) -> NonNull<T> {
        self.ptr
    }

    /// Owning memory
    pub fn memory(&self) -> Option<&SharedMemory<T>> {
        self.owner.as_ref()
    }

    /// Unpin explicitly
    pub fn unpin(self) {
        drop(self)
    }
}

impl<T: Element> Drop for PinnedHandle<T> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            release(owner);
        }
    }
}

impl<T: Element> fmt::Debug for PinnedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedHandle")
            .field("ptr", &self.ptr)
            .finish()
    }
}

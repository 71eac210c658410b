/*!
 * Retained Memory
 *
 * Borrowing handles over retainable memory. A [`RetainedMemory`] owns one
 * counted reference and releases it on drop; [`RetainedSlice`] is a
 * non-counting sub-view tied to the handle it came from.
 */

use super::array::ArrayMemory;
use super::direct::DirectBuffer;
use super::element::Element;
use super::retainable::{contract_violation, counter_error, release, MemoryExt, SharedMemory};
use crate::core::{MemoryError, MemoryResult};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

#[inline]
fn check_range(start: usize, length: usize, bound: usize) -> MemoryResult<()> {
    match start.checked_add(length) {
        Some(end) if end <= bound => Ok(()),
        _ => Err(MemoryError::out_of_range(start, length, bound)),
    }
}

/// A counted borrow of `[start, start + len)` of an owner
///
/// Dropping the handle releases the borrow exactly once. Handles built with
/// [`RetainedMemory::from_raw_parts`] have no owner and release nothing.
///
/// # Example
///
/// ```ignore
/// let memory = PrivateMemory::<u64>::create(64)?;
/// let mut retained = memory.retain_range(8, 16)?;
/// retained.as_mut_slice()?.fill(7);
/// let view = retained.slice(0, 4)?;     // no count change
/// let copy = retained.clone_range(0, 4)?; // count + 1
/// ```
pub struct RetainedMemory<T: Element> {
    owner: Option<SharedMemory<T>>,
    ptr: NonNull<T>,
    start: usize,
    len: usize,
}

// Access goes through the counted owner; T itself is Send + Sync
unsafe impl<T: Element> Send for RetainedMemory<T> {}
unsafe impl<T: Element> Sync for RetainedMemory<T> {}

impl<T: Element> RetainedMemory<T> {
    /// Wrap a reference already counted on `owner`
    pub(crate) fn from_owner(owner: SharedMemory<T>, start: usize, len: usize) -> Self {
        let data = owner.core().data_ptr();
        let ptr = NonNull::new(data)
            .map(|base| unsafe { NonNull::new_unchecked(base.as_ptr().add(start)) })
            .unwrap_or(NonNull::dangling());
        Self {
            owner: Some(owner),
            ptr,
            start,
            len,
        }
    }

    /// Externally owned handle over `len` elements at `ptr`
    ///
    /// # Safety
    ///
    /// The region must stay valid, initialized and free of other mutable
    /// access for the handle's lifetime and that of every clone.
    pub unsafe fn from_raw_parts(ptr: NonNull<T>, len: usize) -> Self {
        Self {
            owner: None,
            ptr,
            start: 0,
            len,
        }
    }

    /// Split into the counted owner and the range, without releasing
    pub(crate) fn into_parts(mut self) -> (Option<SharedMemory<T>>, NonNull<T>, usize) {
        let owner = self.owner.take();
        (owner, self.ptr, self.len)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element offset within the owner
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Owning memory, `None` when externally owned
    pub fn owner(&self) -> Option<&SharedMemory<T>> {
        self.owner.as_ref()
    }

    pub fn is_externally_owned(&self) -> bool {
        self.owner.is_none()
    }

    /// Owner's outstanding references, 0 when externally owned
    pub fn reference_count(&self) -> u32 {
        self.owner
            .as_ref()
            .map(|owner| owner.reference_count())
            .unwrap_or(0)
    }

    /// Stable address of the first element (blittable types only)
    pub fn pointer(&self) -> Option<NonNull<T>> {
        T::BLITTABLE.then_some(self.ptr)
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mutable view, refused while other counted references exist
    pub fn as_mut_slice(&mut self) -> MemoryResult<&mut [T]> {
        let count = self.reference_count();
        if count > 1 {
            return Err(MemoryError::Aliased { count });
        }
        Ok(unsafe { self.as_mut_slice_unchecked() })
    }

    /// Mutable view without the aliasing check
    ///
    /// # Safety
    ///
    /// No other view of the same elements may be used while the returned
    /// slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice_unchecked(&self) -> &mut [T] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
    }

    /// Non-counting sub-view
    pub fn slice(&self, start: usize, len: usize) -> MemoryResult<RetainedSlice<'_, T>> {
        check_range(start, len, self.len)?;
        Ok(RetainedSlice {
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(start)) },
            len,
            _marker: PhantomData,
        })
    }

    /// Independently counted sub-view
    pub fn clone_range(&self, start: usize, len: usize) -> MemoryResult<Self> {
        check_range(start, len, self.len)?;
        if let Some(owner) = &self.owner {
            owner.core().counter().increment().map_err(counter_error)?;
        }
        Ok(Self {
            owner: self.owner.clone(),
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(start)) },
            start: self.start + start,
            len,
        })
    }

    /// Byte-level accessor over the range (blittable types only)
    ///
    /// Refused while other counted references exist.
    pub fn direct_buffer(&mut self) -> MemoryResult<DirectBuffer<'_>> {
        if !T::BLITTABLE {
            return Err(MemoryError::NotBlittable(std::any::type_name::<T>()));
        }
        let count = self.reference_count();
        if count > 1 {
            return Err(MemoryError::Aliased { count });
        }
        Ok(unsafe {
            DirectBuffer::bounded(
                self.ptr.as_ptr().cast(),
                self.len * std::mem::size_of::<T>(),
            )
        })
    }

    /// Release the borrow
    pub fn dispose(self) {
        drop(self)
    }
}

impl<T: Element> Drop for RetainedMemory<T> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            release(owner);
        }
    }
}

impl<T: Element> Clone for RetainedMemory<T> {
    fn clone(&self) -> Self {
        match self.clone_range(0, self.len) {
            Ok(clone) => clone,
            Err(err) => {
                contract_violation(format_args!("clone of retained memory failed: {}", err));
                // Only reached while unwinding: hand out a non-counting view
                Self {
                    owner: None,
                    ptr: self.ptr,
                    start: self.start,
                    len: self.len,
                }
            }
        }
    }
}

impl<T: Element> Deref for RetainedMemory<T> {
    type Target = [T];

    #[inline(always)]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Element> From<Vec<T>> for RetainedMemory<T> {
    fn from(array: Vec<T>) -> Self {
        let memory = ArrayMemory::from_vec(array);
        match memory.retain() {
            Ok(retained) => retained,
            Err(err) => unreachable!("fresh memory refused a retain: {}", err),
        }
    }
}

impl<T: Element> TryFrom<SharedMemory<T>> for RetainedMemory<T> {
    type Error = MemoryError;

    fn try_from(memory: SharedMemory<T>) -> MemoryResult<Self> {
        memory.retain()
    }
}

impl<T: Element> fmt::Debug for RetainedMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetainedMemory")
            .field("kind", &self.owner.as_ref().map(|owner| owner.kind()))
            .field("start", &self.start)
            .field("len", &self.len)
            .field("references", &self.reference_count())
            .finish()
    }
}

// ============================================================================
// RetainedSlice
// ============================================================================

/// Non-counting sub-view of a [`RetainedMemory`]
///
/// Borrows the handle it came from, so it cannot outlive that borrow.
pub struct RetainedSlice<'a, T: Element> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<'a, T: Element> Clone for RetainedSlice<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T: Element> Copy for RetainedSlice<'a, T> {}

unsafe impl<'a, T: Element> Send for RetainedSlice<'a, T> {}
unsafe impl<'a, T: Element> Sync for RetainedSlice<'a, T> {}

impl<'a, T: Element> RetainedSlice<'a, T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Narrower non-counting sub-view
    pub fn slice(&self, start: usize, len: usize) -> MemoryResult<RetainedSlice<'a, T>> {
        check_range(start, len, self.len)?;
        Ok(RetainedSlice {
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(start)) },
            len,
            _marker: PhantomData,
        })
    }
}

impl<'a, T: Element> Deref for RetainedSlice<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T: Element + fmt::Debug> fmt::Debug for RetainedSlice<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

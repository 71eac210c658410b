/*!
 * Type-Erased Views
 *
 * [`RetainedVec`] carries a counted borrow of any element type behind a
 * runtime [`TypeTag`], for containers that cannot thread the element type
 * through. [`VecStorage`] keeps one over a range of retainable memory.
 *
 * # Regions
 *
 * - `Array`: elements live in a managed array (always so for non-blittable
 *   types)
 * - `Native`: elements live in native memory and may be accessed bytewise
 */

use super::direct::DirectBuffer;
use super::element::Element;
use super::retainable::{counter_error, release, MemoryExt, RetainableMemory, SharedMemory};
use super::retained::RetainedMemory;
use crate::core::{type_tag, MemoryError, MemoryResult, TypeTag};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Counted owner with its element type erased
pub trait ErasedOwner: Send + Sync {
    /// Add one counted reference
    fn retain(&self) -> MemoryResult<()>;

    /// Drop one counted reference
    fn release(&self);

    fn reference_count(&self) -> u32;

    fn type_tag(&self) -> TypeTag;
}

struct TypedOwner<T: Element>(SharedMemory<T>);

impl<T: Element> ErasedOwner for TypedOwner<T> {
    fn retain(&self) -> MemoryResult<()> {
        self.0.core().counter().increment().map(|_| ()).map_err(counter_error)
    }

    fn release(&self) {
        release(Arc::clone(&self.0));
    }

    fn reference_count(&self) -> u32 {
        self.0.reference_count()
    }

    fn type_tag(&self) -> TypeTag {
        type_tag::<T>()
    }
}

/// Storage class of a [`RetainedVec`] region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecRegion {
    /// First element of a managed array range
    Array(NonNull<u8>),
    /// First element of a native range
    Native(NonNull<u8>),
}

impl VecRegion {
    #[inline]
    fn base(&self) -> NonNull<u8> {
        match *self {
            VecRegion::Array(base) | VecRegion::Native(base) => base,
        }
    }

    #[inline]
    fn offset(&self, bytes: usize) -> VecRegion {
        let moved = unsafe { NonNull::new_unchecked(self.base().as_ptr().add(bytes)) };
        match self {
            VecRegion::Array(_) => VecRegion::Array(moved),
            VecRegion::Native(_) => VecRegion::Native(moved),
        }
    }
}

/// Type-erased counted view
///
/// Holds exactly one counted reference on its owner, released on drop.
/// Externally owned views have no owner and release nothing.
pub struct RetainedVec {
    owner: Option<Arc<dyn ErasedOwner>>,
    region: VecRegion,
    len: usize,
    element_size: usize,
    tag: TypeTag,
}

// Elements are Send + Sync (Element bound at construction)
unsafe impl Send for RetainedVec {}
unsafe impl Sync for RetainedVec {}

impl RetainedVec {
    fn region_for<T: Element>(ptr: NonNull<T>, array_backed: bool) -> VecRegion {
        if array_backed || !T::BLITTABLE {
            VecRegion::Array(ptr.cast())
        } else {
            VecRegion::Native(ptr.cast())
        }
    }

    /// Take over the borrow held by `retained`
    pub fn from_retained<T: Element>(retained: RetainedMemory<T>) -> Self {
        let (owner, ptr, len) = retained.into_parts();
        let array_backed = owner
            .as_ref()
            .map_or(!T::BLITTABLE, |owner| owner.is_array_backed());
        let owner = owner.map(|owner| Arc::new(TypedOwner(owner)) as Arc<dyn ErasedOwner>);

        Self {
            owner,
            region: Self::region_for(ptr, array_backed),
            len,
            element_size: std::mem::size_of::<T>(),
            tag: type_tag::<T>(),
        }
    }

    /// Externally owned view over `len` elements at `ptr`
    ///
    /// # Safety
    ///
    /// Same contract as [`RetainedMemory::from_raw_parts`].
    pub unsafe fn from_raw_parts<T: Element>(ptr: NonNull<T>, len: usize) -> Self {
        Self {
            owner: None,
            region: Self::region_for(ptr, false),
            len,
            element_size: std::mem::size_of::<T>(),
            tag: type_tag::<T>(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.tag
    }

    #[inline]
    pub fn region(&self) -> VecRegion {
        self.region
    }

    /// Whether the elements live in native memory
    pub fn is_native(&self) -> bool {
        matches!(self.region, VecRegion::Native(_))
    }

    pub fn is_externally_owned(&self) -> bool {
        self.owner.is_none()
    }

    /// Size of the viewed range in bytes
    pub fn byte_len(&self) -> usize {
        self.len * self.element_size
    }

    /// Owner's outstanding references, 0 when externally owned
    pub fn reference_count(&self) -> u32 {
        self.owner
            .as_ref()
            .map(|owner| owner.reference_count())
            .unwrap_or(0)
    }

    #[inline]
    fn check_type<T: Element>(&self) -> MemoryResult<()> {
        let requested = type_tag::<T>();
        if requested != self.tag {
            return Err(MemoryError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: self.tag.name(),
            });
        }
        Ok(())
    }

    fn check_range(&self, start: usize, len: usize) -> MemoryResult<()> {
        match start.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(MemoryError::out_of_range(start, len, self.len)),
        }
    }

    /// Typed view; fails when `T` is not the tagged type
    pub fn as_slice<T: Element>(&self) -> MemoryResult<&[T]> {
        self.check_type::<T>()?;
        Ok(unsafe { std::slice::from_raw_parts(self.region.base().as_ptr().cast(), self.len) })
    }

    /// Mutable typed view, refused while other counted references exist
    pub fn as_mut_slice<T: Element>(&mut self) -> MemoryResult<&mut [T]> {
        self.check_type::<T>()?;
        let count = self.reference_count();
        if count > 1 {
            return Err(MemoryError::Aliased { count });
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.region.base().as_ptr().cast(), self.len) })
    }

    /// Element at `index`
    pub fn get<T: Element>(&self, index: usize) -> MemoryResult<&T> {
        let slice = self.as_slice::<T>()?;
        slice
            .get(index)
            .ok_or_else(|| MemoryError::out_of_range(index, 1, self.len))
    }

    /// Narrow to `[start, start + len)`, keeping the same borrow
    ///
    /// On error the view is dropped and its borrow released.
    pub fn slice(mut self, start: usize, len: usize) -> MemoryResult<RetainedVec> {
        self.check_range(start, len)?;
        self.region = self.region.offset(start * self.element_size);
        self.len = len;
        Ok(self)
    }

    /// Independently counted view of `[start, start + len)`
    pub fn clone_range(&self, start: usize, len: usize) -> MemoryResult<RetainedVec> {
        self.check_range(start, len)?;
        if let Some(owner) = &self.owner {
            owner.retain()?;
        }
        Ok(Self {
            owner: self.owner.clone(),
            region: self.region.offset(start * self.element_size),
            len,
            element_size: self.element_size,
            tag: self.tag,
        })
    }

    /// Byte accessor over a native region
    pub fn direct_buffer(&mut self) -> MemoryResult<DirectBuffer<'_>> {
        let VecRegion::Native(base) = self.region else {
            return Err(MemoryError::NotBlittable(self.tag.name()));
        };
        let count = self.reference_count();
        if count > 1 {
            return Err(MemoryError::Aliased { count });
        }
        Ok(unsafe { DirectBuffer::bounded(base.as_ptr(), self.byte_len()) })
    }
}

impl Drop for RetainedVec {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.release();
        }
    }
}

impl<T: Element> From<RetainedMemory<T>> for RetainedVec {
    fn from(retained: RetainedMemory<T>) -> Self {
        Self::from_retained(retained)
    }
}

impl fmt::Debug for RetainedVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetainedVec")
            .field("type", &self.tag)
            .field("native", &self.is_native())
            .field("len", &self.len)
            .field("external", &self.is_externally_owned())
            .finish()
    }
}

// ============================================================================
// VecStorage
// ============================================================================

/// A retained range of retainable memory kept as a [`RetainedVec`]
#[derive(Debug)]
pub struct VecStorage {
    vec: RetainedVec,
}

impl VecStorage {
    /// Retain `[start, start + len)` of `memory`
    pub fn create<T, M>(memory: &Arc<M>, start: usize, len: usize) -> MemoryResult<Self>
    where
        T: Element,
        M: RetainableMemory<T> + ?Sized,
    {
        let retained = memory.retain_range(start, len)?;
        Ok(Self {
            vec: RetainedVec::from_retained(retained),
        })
    }

    pub fn vec(&self) -> &RetainedVec {
        &self.vec
    }

    pub fn vec_mut(&mut self) -> &mut RetainedVec {
        &mut self.vec
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn type_tag(&self) -> TypeTag {
        self.vec.type_tag()
    }

    pub fn byte_len(&self) -> usize {
        self.vec.byte_len()
    }

    /// Narrow, transferring the borrow
    pub fn slice(self, start: usize, len: usize) -> MemoryResult<VecStorage> {
        Ok(Self {
            vec: self.vec.slice(start, len)?,
        })
    }

    /// Independently counted copy of the whole range
    pub fn clone_storage(&self) -> MemoryResult<VecStorage> {
        Ok(Self {
            vec: self.vec.clone_range(0, self.vec.len())?,
        })
    }

    /// Release the borrow
    pub fn dispose(self) {
        drop(self)
    }

    /// Give up the storage wrapper, keeping the borrow
    pub fn into_vec(self) -> RetainedVec {
        self.vec
    }
}

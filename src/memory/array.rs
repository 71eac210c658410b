/*!
 * Array Memory
 * Retainable memory over a managed array rented from the shared array pool
 */

use super::array_pool::ArrayPool;
use super::element::{byte_length, Element};
use super::object_pool::ObjectPool;
use super::retainable::{MemoryCore, MemoryKind, RetainableMemory, SharedMemory};
use crate::core::MemoryResult;
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::Arc;

enum ArrayBacking<T> {
    /// Rented from the shared array pool, returned on free
    Pooled(Vec<T>),
    /// Supplied by the caller, dropped on free
    External(Vec<T>),
    Empty,
}

/// Retainable memory backed by a `Vec<T>`
///
/// Instances and arrays are pooled independently: arrays go back to the
/// shared [`ArrayPool`], freed instances to the shared [`ObjectPool`].
pub struct ArrayMemory<T: Element> {
    core: MemoryCore<T>,
    backing: Mutex<ArrayBacking<T>>,
}

impl<T: Element> ArrayMemory<T> {
    fn empty() -> Self {
        Self {
            core: MemoryCore::new(),
            backing: Mutex::new(ArrayBacking::Empty),
        }
    }

    /// Memory over a pooled array of at least `min_length` elements
    ///
    /// The length is the rented array's length.
    pub fn create(min_length: usize) -> MemoryResult<Arc<Self>> {
        byte_length::<T>(min_length)?;
        let array = ArrayPool::<T>::shared().rent(min_length);
        Ok(Self::with_backing(ArrayBacking::Pooled(array)))
    }

    /// Memory over a caller-supplied array
    ///
    /// The array is dropped on free rather than pooled.
    pub fn from_vec(array: Vec<T>) -> Arc<Self> {
        Self::with_backing(ArrayBacking::External(array))
    }

    fn with_backing(mut backing: ArrayBacking<T>) -> Arc<Self> {
        let memory = ObjectPool::<Self>::shared()
            .rent()
            .unwrap_or_else(|| Arc::new(Self::empty()));

        let (ptr, length) = match &mut backing {
            ArrayBacking::Pooled(array) | ArrayBacking::External(array) => {
                (array.as_mut_ptr(), array.len())
            }
            ArrayBacking::Empty => (NonNull::dangling().as_ptr(), 0),
        };
        *memory.backing.lock() = backing;

        // Vec pointers are never null, dangling when empty
        let base = NonNull::new(ptr).unwrap_or(NonNull::dangling());
        memory.core.init(base, 0, length, length);
        memory
    }

    /// Length of the backing array
    pub fn array_len(&self) -> usize {
        match &*self.backing.lock() {
            ArrayBacking::Pooled(array) | ArrayBacking::External(array) => array.len(),
            ArrayBacking::Empty => 0,
        }
    }

    /// Whether the array was supplied by the caller
    pub fn is_external(&self) -> bool {
        matches!(&*self.backing.lock(), ArrayBacking::External(_))
    }
}

impl<T: Element> RetainableMemory<T> for ArrayMemory<T> {
    fn core(&self) -> &MemoryCore<T> {
        &self.core
    }

    fn kind(&self) -> MemoryKind {
        MemoryKind::Array
    }

    fn is_array_backed(&self) -> bool {
        true
    }

    fn free_backing(&self, disposing: bool) {
        let backing = std::mem::replace(&mut *self.backing.lock(), ArrayBacking::Empty);
        match backing {
            ArrayBacking::Pooled(array) if disposing => {
                ArrayPool::<T>::shared().release(array, !T::BLITTABLE)
            }
            ArrayBacking::Pooled(_) | ArrayBacking::External(_) | ArrayBacking::Empty => {}
        }
    }

    fn into_shared(self: Arc<Self>) -> SharedMemory<T> {
        self
    }

    fn recycle(self: Arc<Self>) {
        ObjectPool::<Self>::shared().give_back(self);
    }
}

impl<T: Element> Drop for ArrayMemory<T> {
    fn drop(&mut self) {
        if self.core.finalize(MemoryKind::Array) {
            self.free_backing(false);
        }
    }
}

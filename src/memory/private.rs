/*!
 * Private Memory
 *
 * Retainable memory that owns its backing outright: aligned native memory
 * for blittable element types, a pooled managed array otherwise.
 *
 * The backing is a tagged variant, so "pointer xor array" holds by
 * construction.
 */

use super::allocator::{self, NativeBlock};
use super::array_pool::ArrayPool;
use super::element::{byte_length, Element};
use super::object_pool::ObjectPool;
use super::retainable::{MemoryCore, MemoryKind, RetainableMemory, SharedMemory};
use crate::core::{MemoryResult, Settings};
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::Arc;

/// Storage owned by a [`PrivateMemory`]
#[derive(Debug)]
pub(crate) enum PrivateBacking<T> {
    Native {
        ptr: NonNull<u8>,
        bytes: usize,
        alignment: usize,
    },
    Array(Vec<T>),
    Empty,
}

// The native block is owned exclusively by the backing
unsafe impl<T: Send> Send for PrivateBacking<T> {}

/// Retainable memory with privately owned backing
pub struct PrivateMemory<T: Element> {
    core: MemoryCore<T>,
    backing: Mutex<PrivateBacking<T>>,
}

impl<T: Element> PrivateMemory<T> {
    fn empty() -> Self {
        Self {
            core: MemoryCore::new(),
            backing: Mutex::new(PrivateBacking::Empty),
        }
    }

    /// Alignment used for native backing of `T`
    ///
    /// The element size rounded to a power of two, clamped to the configured
    /// native alignment range.
    pub fn native_alignment() -> usize {
        let natural = std::mem::size_of::<T>()
            .next_power_of_two()
            .max(std::mem::align_of::<T>());
        Settings::global().clamp_alignment(natural)
    }

    /// Memory of exactly `length` elements
    ///
    /// Blittable types get zero-filled native memory; other types get an
    /// array from the shared array pool.
    pub fn create(length: usize) -> MemoryResult<Arc<Self>> {
        let bytes = byte_length::<T>(length)?;

        let backing = if T::BLITTABLE {
            let block = allocator::allocate_zeroed(bytes, Self::native_alignment())?;
            PrivateBacking::Native {
                ptr: block.ptr,
                bytes: block.size,
                alignment: block.alignment,
            }
        } else {
            PrivateBacking::Array(ArrayPool::<T>::shared().rent(length))
        };

        let memory = ObjectPool::<Self>::shared()
            .rent()
            .unwrap_or_else(|| Arc::new(Self::empty()));
        memory.attach(backing, length);
        Ok(memory)
    }

    fn attach(&self, mut backing: PrivateBacking<T>, length: usize) {
        let (base, capacity) = match &mut backing {
            PrivateBacking::Native { ptr, bytes, .. } => {
                (ptr.cast::<T>(), *bytes / std::mem::size_of::<T>())
            }
            PrivateBacking::Array(array) => (
                NonNull::new(array.as_mut_ptr()).unwrap_or(NonNull::dangling()),
                array.len(),
            ),
            PrivateBacking::Empty => (NonNull::dangling(), 0),
        };
        *self.backing.lock() = backing;
        self.core.init(base, 0, length, capacity);
    }

    /// Whether the backing is native memory
    pub fn has_native(&self) -> bool {
        matches!(&*self.backing.lock(), PrivateBacking::Native { .. })
    }

    /// Whether the backing is a managed array
    pub fn has_array(&self) -> bool {
        matches!(&*self.backing.lock(), PrivateBacking::Array(_))
    }

    /// Alignment of the native backing
    pub fn alignment(&self) -> Option<usize> {
        match &*self.backing.lock() {
            PrivateBacking::Native { alignment, .. } => Some(*alignment),
            _ => None,
        }
    }
}

impl<T: Element> RetainableMemory<T> for PrivateMemory<T> {
    fn core(&self) -> &MemoryCore<T> {
        &self.core
    }

    fn kind(&self) -> MemoryKind {
        MemoryKind::Private
    }

    fn is_array_backed(&self) -> bool {
        !T::BLITTABLE
    }

    fn free_backing(&self, disposing: bool) {
        let backing = std::mem::replace(&mut *self.backing.lock(), PrivateBacking::Empty);
        match backing {
            PrivateBacking::Native {
                ptr,
                bytes,
                alignment,
            } => unsafe {
                allocator::free(NativeBlock {
                    ptr,
                    size: bytes,
                    alignment,
                })
            },
            PrivateBacking::Array(array) if disposing => {
                ArrayPool::<T>::shared().release(array, true)
            }
            PrivateBacking::Array(_) | PrivateBacking::Empty => {}
        }
    }

    fn into_shared(self: Arc<Self>) -> SharedMemory<T> {
        self
    }

    fn recycle(self: Arc<Self>) {
        ObjectPool::<Self>::shared().give_back(self);
    }
}

impl<T: Element> Drop for PrivateMemory<T> {
    fn drop(&mut self) {
        if self.core.finalize(MemoryKind::Private) {
            self.free_backing(false);
        }
    }
}

/*!
 * Direct Buffer
 *
 * Non-owning byte accessor over a pointer and length. All offsets are byte
 * offsets; plain reads and writes are unaligned.
 *
 * Buffers built from safe borrows always check bounds. Buffers built with
 * the unsafe [`DirectBuffer::from_raw_parts`] check them only while
 * correctness checks are enabled (see [`crate::core::config`]). A failed check
 * panics like slice indexing. Interlocked operations always assert natural
 * alignment.
 *
 * # Threads
 *
 * Plain accesses are unsynchronized, so a buffer stays on the thread that
 * built it (neither `Send` nor `Sync`). Threads sharing memory each build
 * their own buffer with `from_raw_parts` and coordinate through the
 * interlocked accessors.
 */

use crate::core::correctness_checks_enabled;
use crate::core::hints::unlikely;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use uuid::Uuid;

/// Unsafe byte accessor over `[ptr, ptr + len)`
///
/// # Performance
///
/// - **Checked**: one compare per access
/// - **Unchecked**: a single unaligned load or store
///
/// # Example
///
/// ```ignore
/// let mut bytes = [0u8; 16];
/// let buffer = DirectBuffer::from_slice(&mut bytes);
/// buffer.write_i64(0, 42);
/// assert_eq!(buffer.read_i64(0), 42);
/// ```
#[derive(Clone, Copy)]
pub struct DirectBuffer<'a> {
    ptr: *mut u8,
    len: usize,
    bounded: bool,
    _marker: PhantomData<&'a mut [u8]>,
}

macro_rules! plain_access {
    ($($read:ident, $write:ident => $ty:ty);* $(;)?) => {
        $(
            #[doc = concat!("Unaligned `", stringify!($ty), "` read at byte `offset`")]
            #[inline]
            pub fn $read(&self, offset: usize) -> $ty {
                self.check(offset, std::mem::size_of::<$ty>());
                unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const $ty) }
            }

            #[doc = concat!("Unaligned `", stringify!($ty), "` write at byte `offset`")]
            #[inline]
            pub fn $write(&self, offset: usize, value: $ty) {
                self.check(offset, std::mem::size_of::<$ty>());
                unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut $ty, value) }
            }
        )*
    };
}

impl<'a> DirectBuffer<'a> {
    /// Accessor over raw memory, bounds-checked only while checks are enabled
    ///
    /// # Safety
    ///
    /// `[ptr, ptr + len)` must be valid for reads and writes for `'a`, and
    /// not accessed through a conflicting reference meanwhile. Plain accesses
    /// through buffers on other threads must not overlap this one's. With
    /// correctness checks off, every offset passed in must stay in range.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr,
            len,
            bounded: false,
            _marker: PhantomData,
        }
    }

    /// Always bounds-checked accessor over raw memory
    ///
    /// # Safety
    ///
    /// Same validity contract as [`DirectBuffer::from_raw_parts`].
    #[inline]
    pub(crate) unsafe fn bounded(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr,
            len,
            bounded: true,
            _marker: PhantomData,
        }
    }

    /// Accessor over a byte slice; always bounds-checked
    #[inline]
    pub fn from_slice(bytes: &'a mut [u8]) -> Self {
        unsafe { Self::bounded(bytes.as_mut_ptr(), bytes.len()) }
    }

    /// Whether accesses are checked regardless of the global switch
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.bounded
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
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline(always)]
    fn check(&self, offset: usize, size: usize) {
        if self.bounded || correctness_checks_enabled() {
            let in_bounds = offset
                .checked_add(size)
                .map_or(false, |end| end <= self.len);
            if unlikely(!in_bounds) {
                out_of_bounds(offset, size, self.len);
            }
        }
    }

    #[inline(always)]
    fn check_alignment(&self, offset: usize, align: usize) {
        let address = self.ptr as usize + offset;
        assert!(
            address % align == 0,
            "unaligned interlocked access at offset {} (address {:#x}, alignment {})",
            offset,
            address,
            align
        );
    }

    /// Sub-buffer of `length` bytes at `offset`
    pub fn slice(&self, offset: usize, length: usize) -> DirectBuffer<'a> {
        self.check(offset, length);
        Self {
            ptr: unsafe { self.ptr.add(offset) },
            len: length,
            bounded: self.bounded,
            _marker: PhantomData,
        }
    }

    // ========================================================================
    // Plain access
    // ========================================================================

    plain_access! {
        read_i8, write_i8 => i8;
        read_u8, write_u8 => u8;
        read_i16, write_i16 => i16;
        read_u16, write_u16 => u16;
        read_i32, write_i32 => i32;
        read_u32, write_u32 => u32;
        read_i64, write_i64 => i64;
        read_u64, write_u64 => u64;
        read_f32, write_f32 => f32;
        read_f64, write_f64 => f64;
    }

    /// UUID read at byte `offset` (16 raw bytes)
    #[inline]
    pub fn read_uuid(&self, offset: usize) -> Uuid {
        self.check(offset, 16);
        let bytes: [u8; 16] = unsafe { ptr::read_unaligned(self.ptr.add(offset) as *const [u8; 16]) };
        Uuid::from_bytes(bytes)
    }

    /// UUID write at byte `offset` (16 raw bytes)
    #[inline]
    pub fn write_uuid(&self, offset: usize, value: Uuid) {
        self.check(offset, 16);
        unsafe { ptr::write_unaligned(self.ptr.add(offset) as *mut [u8; 16], *value.as_bytes()) }
    }

    // ========================================================================
    // Volatile access
    // ========================================================================

    #[inline]
    pub fn volatile_read_i32(&self, offset: usize) -> i32 {
        self.check(offset, 4);
        self.check_alignment(offset, 4);
        unsafe { ptr::read_volatile(self.ptr.add(offset) as *const i32) }
    }

    #[inline]
    pub fn volatile_write_i32(&self, offset: usize, value: i32) {
        self.check(offset, 4);
        self.check_alignment(offset, 4);
        unsafe { ptr::write_volatile(self.ptr.add(offset) as *mut i32, value) }
    }

    #[inline]
    pub fn volatile_read_i64(&self, offset: usize) -> i64 {
        self.check(offset, 8);
        self.check_alignment(offset, 8);
        unsafe { ptr::read_volatile(self.ptr.add(offset) as *const i64) }
    }

    #[inline]
    pub fn volatile_write_i64(&self, offset: usize, value: i64) {
        self.check(offset, 8);
        self.check_alignment(offset, 8);
        unsafe { ptr::write_volatile(self.ptr.add(offset) as *mut i64, value) }
    }

    // ========================================================================
    // Interlocked access
    // ========================================================================

    #[inline]
    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        self.check(offset, 4);
        self.check_alignment(offset, 4);
        unsafe { AtomicI32::from_ptr(self.ptr.add(offset) as *mut i32) }
    }

    #[inline]
    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        self.check(offset, 8);
        self.check_alignment(offset, 8);
        unsafe { AtomicI64::from_ptr(self.ptr.add(offset) as *mut i64) }
    }

    pub fn interlocked_read_i32(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).load(Ordering::SeqCst)
    }

    /// Atomic increment, returning the new value
    pub fn interlocked_increment_i32(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Atomic decrement, returning the new value
    pub fn interlocked_decrement_i32(&self, offset: usize) -> i32 {
        self.atomic_i32(offset).fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
    }

    /// Atomic add, returning the new value
    pub fn interlocked_add_i32(&self, offset: usize, delta: i32) -> i32 {
        self.atomic_i32(offset)
            .fetch_add(delta, Ordering::SeqCst)
            .wrapping_add(delta)
    }

    /// Atomic swap, returning the previous value
    pub fn interlocked_exchange_i32(&self, offset: usize, value: i32) -> i32 {
        self.atomic_i32(offset).swap(value, Ordering::SeqCst)
    }

    /// Atomic compare-and-swap, returning the previous value
    pub fn interlocked_compare_exchange_i32(&self, offset: usize, value: i32, comparand: i32) -> i32 {
        match self.atomic_i32(offset).compare_exchange(
            comparand,
            value,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    pub fn interlocked_read_i64(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).load(Ordering::SeqCst)
    }

    /// Atomic increment, returning the new value
    pub fn interlocked_increment_i64(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Atomic decrement, returning the new value
    pub fn interlocked_decrement_i64(&self, offset: usize) -> i64 {
        self.atomic_i64(offset).fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
    }

    /// Atomic add, returning the new value
    pub fn interlocked_add_i64(&self, offset: usize, delta: i64) -> i64 {
        self.atomic_i64(offset)
            .fetch_add(delta, Ordering::SeqCst)
            .wrapping_add(delta)
    }

    /// Atomic swap, returning the previous value
    pub fn interlocked_exchange_i64(&self, offset: usize, value: i64) -> i64 {
        self.atomic_i64(offset).swap(value, Ordering::SeqCst)
    }

    /// Atomic compare-and-swap, returning the previous value
    pub fn interlocked_compare_exchange_i64(&self, offset: usize, value: i64, comparand: i64) -> i64 {
        match self.atomic_i64(offset).compare_exchange(
            comparand,
            value,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    // ========================================================================
    // Block operations
    // ========================================================================

    /// Copy `length` bytes from `offset` into `destination`
    ///
    /// # Safety
    ///
    /// `destination` must be valid for `length` bytes of writes and not
    /// overlap this buffer's range.
    pub unsafe fn copy_to_ptr(&self, offset: usize, destination: *mut u8, length: usize) {
        self.check(offset, length);
        ptr::copy_nonoverlapping(self.ptr.add(offset), destination, length);
    }

    /// Copy `length` bytes from `source` into `offset`
    ///
    /// # Safety
    ///
    /// `source` must be valid for `length` bytes of reads and not overlap
    /// this buffer's range.
    pub unsafe fn copy_from_ptr(&self, offset: usize, source: *const u8, length: usize) {
        self.check(offset, length);
        ptr::copy_nonoverlapping(source, self.ptr.add(offset), length);
    }

    /// Copy `destination.len()` bytes starting at `offset` into `destination`
    pub fn copy_to_slice(&self, offset: usize, destination: &mut [u8]) {
        self.check(offset, destination.len());
        unsafe {
            ptr::copy_nonoverlapping(
                self.ptr.add(offset),
                destination.as_mut_ptr(),
                destination.len(),
            )
        }
    }

    /// Copy `source` into the buffer at `offset`
    pub fn copy_from_slice(&self, offset: usize, source: &[u8]) {
        self.check(offset, source.len());
        unsafe { ptr::copy_nonoverlapping(source.as_ptr(), self.ptr.add(offset), source.len()) }
    }

    /// Copy `length` bytes at `offset` into `destination` at `destination_offset`
    ///
    /// The ranges may overlap.
    pub fn copy_to(
        &self,
        offset: usize,
        destination: &DirectBuffer<'_>,
        destination_offset: usize,
        length: usize,
    ) {
        self.check(offset, length);
        destination.check(destination_offset, length);
        unsafe {
            ptr::copy(
                self.ptr.add(offset),
                destination.ptr.add(destination_offset),
                length,
            )
        }
    }

    /// Copy the bytes at `[offset, offset + length)` into a new vector
    pub fn read_bytes(&self, offset: usize, length: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; length];
        self.copy_to_slice(offset, &mut bytes);
        bytes
    }

    /// Set every byte to `value`
    pub fn fill(&self, value: u8) {
        unsafe { ptr::write_bytes(self.ptr, value, self.len) }
    }

    /// Zero `length` bytes at `offset`
    pub fn clear(&self, offset: usize, length: usize) {
        self.check(offset, length);
        unsafe { ptr::write_bytes(self.ptr.add(offset), 0, length) }
    }
}

impl std::fmt::Debug for DirectBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("bounded", &self.bounded)
            .finish()
    }
}

#[cold]
#[inline(never)]
fn out_of_bounds(offset: usize, size: usize, len: usize) -> ! {
    panic!(
        "direct buffer access {}..{} out of bounds for length {}",
        offset,
        offset.saturating_add(size),
        len
    )
}

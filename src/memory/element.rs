/*!
 * Element Types
 * Marker trait separating blittable element types from reference-holding ones
 */

use std::sync::Arc;

/// Element type storable in retainable memory
///
/// Blittable types may live in native memory; other types are always kept in
/// managed arrays and are reset to `Default` when their memory is recycled.
///
/// # Safety
///
/// An implementation setting `BLITTABLE = true` promises that the type has no
/// drop glue, that the all-zero bit pattern is a valid value, and that values
/// may be copied bytewise. `BLITTABLE = false` is always sound.
pub unsafe trait Element: Default + Send + Sync + 'static {
    /// Whether the type may be stored in native memory
    const BLITTABLE: bool;
}

macro_rules! blittable {
    ($($ty:ty),* $(,)?) => {
        $(
            unsafe impl Element for $ty {
                const BLITTABLE: bool = true;
            }
        )*
    };
}

blittable!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char);

unsafe impl Element for uuid::Uuid {
    const BLITTABLE: bool = true;
}

unsafe impl Element for String {
    const BLITTABLE: bool = false;
}

unsafe impl<U: Send + Sync + 'static> Element for Vec<U> {
    const BLITTABLE: bool = false;
}

unsafe impl<U: Send + Sync + 'static> Element for Option<Arc<U>> {
    const BLITTABLE: bool = false;
}

/// Byte size of `length` elements of `T`, bounded by the native length domain
pub(crate) fn byte_length<T: Element>(length: usize) -> crate::core::MemoryResult<usize> {
    let element_size = std::mem::size_of::<T>();
    length
        .checked_mul(element_size)
        .filter(|bytes| element_size != 0 && *bytes <= crate::core::limits::MAX_NATIVE_BYTES)
        .ok_or(crate::core::MemoryError::SizeOverflow {
            length,
            element_size,
        })
}

/*!
 * Branch Hints
 * Branch prediction hints for the rent/return and retain/release hot paths
 */

/// Hint that `b` is usually true
///
/// On nightly (`nightly` feature) this lowers to `llvm.expect`; on stable it
/// is an identity function kept for the code-layout intent.
#[inline(always)]
#[must_use]
pub fn likely(b: bool) -> bool {
    #[cfg(feature = "nightly")]
    {
        unsafe { core::intrinsics::likely(b) }
    }
    #[cfg(not(feature = "nightly"))]
    {
        b
    }
}

/// Hint that `b` is usually false (error and contract-violation paths)
#[inline(always)]
#[must_use]
pub fn unlikely(b: bool) -> bool {
    #[cfg(feature = "nightly")]
    {
        unsafe { core::intrinsics::unlikely(b) }
    }
    #[cfg(not(feature = "nightly"))]
    {
        b
    }
}

/// Marks the enclosing path as cold
#[cold]
#[inline(never)]
pub fn cold_path() {}

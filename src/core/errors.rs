/*!
 * Error Types
 * Centralized error handling with thiserror and miette diagnostics
 */

use miette::Diagnostic;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Failures of the packed reference counter
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterError {
    #[error("counter is disposed")]
    Disposed,

    #[error("counter is retained ({0} outstanding references)")]
    Retained(u32),

    #[error("counter would drop below zero")]
    Underflow,

    #[error("counter overflow: reference count limit reached")]
    Overflow,
}

/// Memory errors
///
/// Usage errors (`Disposed`, `Retained`, `AlreadyPooled`, `ForeignPool`,
/// `OutOfRange`, `TypeMismatch`) indicate a broken ownership contract and are
/// never corrected silently.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MemoryError {
    #[error("Memory is disposed")]
    #[diagnostic(
        code(memory::disposed),
        help("The instance was freed or returned to its pool. Retain before the last release.")
    )]
    Disposed,

    #[error("Memory is retained by {count} outstanding references")]
    #[diagnostic(
        code(memory::retained),
        help("Dispose every RetainedMemory, clone and pin before disposing the owner.")
    )]
    Retained { count: u32 },

    #[error("Memory is already pooled")]
    #[diagnostic(
        code(memory::already_pooled),
        help("An instance was returned twice. Each rent must be returned exactly once.")
    )]
    AlreadyPooled,

    #[error("Memory belongs to pool {actual:?}, not pool {expected}")]
    #[diagnostic(
        code(memory::foreign_pool),
        help("Return memory only to the pool it was rented from.")
    )]
    ForeignPool { expected: u32, actual: Option<u32> },

    #[error("Range {start}..{start}+{length} out of bounds for length {bound}")]
    #[diagnostic(code(memory::out_of_range))]
    OutOfRange {
        start: usize,
        length: usize,
        bound: usize,
    },

    #[error("Type mismatch: view holds {actual}, requested {expected}")]
    #[diagnostic(
        code(memory::type_mismatch),
        help("Read a type-erased view with the element type it was created from.")
    )]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Element type {0} is not blittable")]
    #[diagnostic(
        code(memory::not_blittable),
        help("Native and off-heap storage only hold types without references.")
    )]
    NotBlittable(&'static str),

    #[error("Size overflow: {length} elements of {element_size} bytes")]
    #[diagnostic(code(memory::size_overflow))]
    SizeOverflow { length: usize, element_size: usize },

    #[error("Out of memory: requested {requested} bytes with alignment {alignment}")]
    #[diagnostic(
        code(memory::out_of_memory),
        help("System may be low on memory. Consider freeing resources.")
    )]
    OutOfMemory { requested: usize, alignment: usize },

    #[error("Alignment error: alignment {alignment} must be a power of two within {min}..={max}")]
    #[diagnostic(code(memory::invalid_alignment))]
    InvalidAlignment {
        alignment: usize,
        min: usize,
        max: usize,
    },

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(memory::configuration),
        help("Invalid configuration. Review pool configuration parameters.")
    )]
    Configuration(String),

    #[error("Native allocator already set or already in use")]
    #[diagnostic(
        code(memory::allocator_already_set),
        help("Install custom allocator delegates once, before the first native allocation.")
    )]
    AllocatorAlreadySet,

    #[error("Native allocator self test failed: {0}")]
    #[diagnostic(code(memory::allocator_self_test))]
    AllocatorSelfTest(String),

    #[error("Memory is aliased by {count} references")]
    #[diagnostic(
        code(memory::aliased),
        help("Mutable access needs the only counted reference. Dispose clones first.")
    )]
    Aliased { count: u32 },

    #[error("Counter error: {0}")]
    Counter(#[from] CounterError),
}

impl MemoryError {
    /// Whether the error signals a broken ownership contract
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            MemoryError::Disposed
                | MemoryError::Retained { .. }
                | MemoryError::AlreadyPooled
                | MemoryError::ForeignPool { .. }
                | MemoryError::OutOfRange { .. }
                | MemoryError::TypeMismatch { .. }
                | MemoryError::Aliased { .. }
                | MemoryError::Counter(_)
        )
    }

    pub(crate) fn out_of_range(start: usize, length: usize, bound: usize) -> Self {
        MemoryError::OutOfRange {
            start,
            length,
            bound,
        }
    }
}

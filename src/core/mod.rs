/*!
 * Core Module
 * Errors, limits, settings, CPU topology and runtime type tags
 */

pub mod config;
pub mod cpu;
pub mod errors;
pub mod hints;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::{
    correctness_checks_enabled, disable_correctness_checks, enable_correctness_checks, Settings,
};
pub use cpu::{core_count, current_core_id, CpuTopology};
pub use errors::*;
pub use hints::*;
pub use types::{type_slot, type_tag, TypeInfo, TypeTag};

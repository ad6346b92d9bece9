//! Apply side of a stage: where events reach the downstream system.

mod base;
mod memory;

pub use base::{Applier, FilteredRange};
pub use memory::{ApplierCall, MemoryApplier};

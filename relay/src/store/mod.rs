//! Read-only store inspection consumed by the chunk planner.

mod base;
mod memory;

pub use base::{KeyKind, KeyStatistics, KeyValue, PrimaryKey, StoreInspector, TableInfo};
pub use memory::MemoryInspector;

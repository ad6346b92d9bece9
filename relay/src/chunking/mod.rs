//! Chunked bulk extraction: splits large tables into bounded key ranges for
//! parallel snapshot extraction.

mod chunk;
mod definitions;
mod planner;

pub use chunk::{NumericChunk, TableRef};
pub use definitions::{ChunkDefinitions, ChunkRequest};
pub use planner::{ChunkPlanner, ChunkPlannerHandle};

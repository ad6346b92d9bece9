//! Extraction side of a stage: where events enter the loop.

mod base;
mod memory;

pub use base::Extractor;
pub use memory::MemoryExtractor;

//! relay: a parallel transaction-log replication core.
//!
//! The crate implements the ordering-and-dispatch heart of a database
//! replication engine: a [`dispatch::ParallelDispatchQueue`] fans a totally
//! ordered event stream out to N partition readers while serializing
//! critical sections, [`stage::StageTask`] loops couple extractors, filter
//! chains, and appliers with block-commit batching and failure policies, and
//! a [`chunking::ChunkPlanner`] splits large tables into bounded key ranges
//! for parallel snapshot extraction. Wire decoding, THL storage, and real
//! database drivers live behind the narrow traits in [`extractor`],
//! [`applier`], and [`store`].

pub mod applier;
pub mod chunking;
pub mod concurrency;
pub mod dispatch;
pub mod error;
pub mod extractor;
pub mod filter;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod stage;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

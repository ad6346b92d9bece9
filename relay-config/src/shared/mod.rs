//! Shared configuration types for relay replication pipelines.

mod chunking;
mod dispatch;
mod replicator;
mod stage;

use thiserror::Error;

pub use chunking::ChunkingConfig;
pub use dispatch::DispatchConfig;
pub use replicator::ReplicatorConfig;
pub use stage::{FailurePolicy, SkipRange, StageConfig};

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field holds a value outside its accepted range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },
    /// A skip range is inverted.
    #[error("invalid skip range: start_seqno {start_seqno} is greater than end_seqno {end_seqno}")]
    InvalidSkipRange { start_seqno: u64, end_seqno: u64 },
}

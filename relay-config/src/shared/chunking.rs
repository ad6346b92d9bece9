use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the chunked bulk extraction planner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChunkingConfig {
    /// Target number of rows per chunk when a table is split.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Number of extract workers consuming the chunk queue.
    ///
    /// The planner emits one end-of-stream chunk per channel so every worker
    /// exits cleanly.
    #[serde(default = "default_extract_channels")]
    pub extract_channels: u32,
    /// Optional path to a chunk-definitions document.
    #[serde(default)]
    pub definitions_file: Option<PathBuf>,
    /// Capacity of the bounded chunk work queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl ChunkingConfig {
    /// Default target rows per chunk.
    pub const DEFAULT_CHUNK_SIZE: u64 = 1000;

    /// Default number of extract channels.
    pub const DEFAULT_EXTRACT_CHANNELS: u32 = 1;

    /// Default chunk queue capacity.
    pub const DEFAULT_QUEUE_SIZE: usize = 64;

    /// Validates chunking configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chunk_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "chunking.chunk_size",
                constraint: "must be greater than 0",
            });
        }

        if self.extract_channels == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "chunking.extract_channels",
                constraint: "must be greater than 0",
            });
        }

        if self.queue_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "chunking.queue_size",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            extract_channels: default_extract_channels(),
            definitions_file: None,
            queue_size: default_queue_size(),
        }
    }
}

fn default_chunk_size() -> u64 {
    ChunkingConfig::DEFAULT_CHUNK_SIZE
}

fn default_extract_channels() -> u32 {
    ChunkingConfig::DEFAULT_EXTRACT_CHANNELS
}

fn default_queue_size() -> usize {
    ChunkingConfig::DEFAULT_QUEUE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ChunkingConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = ChunkingConfig {
            chunk_size: 0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}

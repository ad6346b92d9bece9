use serde::{Deserialize, Serialize};

use crate::shared::{ChunkingConfig, DispatchConfig, StageConfig, ValidationError};

/// Top-level configuration for a relay replication service.
///
/// A replicator combines the dispatch fan-out, the per-partition stage tasks,
/// and the bulk-extraction planner into one service instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReplicatorConfig {
    /// Name identifying the logical replication service.
    ///
    /// The service name is stamped into event metadata on extraction and used
    /// by stage tasks to detect cross-service transaction boundaries.
    pub service_name: String,
    /// Parallel dispatch queue settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Stage task loop settings.
    #[serde(default)]
    pub stage: StageConfig,
    /// Bulk extraction planner settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl ReplicatorConfig {
    /// Validates all configuration sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.service_name.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "service_name",
                constraint: "must not be empty",
            });
        }

        self.dispatch.validate()?;
        self.stage.validate()?;
        self.chunking.validate()?;

        Ok(())
    }
}

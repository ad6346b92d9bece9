use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the parallel dispatch queue and its partition readers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatchConfig {
    /// Number of partitions the event stream is fanned out to.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// Capacity of each partition's data queue.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Capacity of each partition's control-event queue.
    #[serde(default = "default_max_control_events")]
    pub max_control_events: usize,
    /// Maximum number of critical sections that may be pending at once.
    ///
    /// Overflowing this bound is fatal and indicates mis-sized buffers.
    #[serde(default = "default_max_critical_sections")]
    pub max_critical_sections: usize,
    /// Whether automatic sync control events are generated.
    #[serde(default = "default_sync_enabled")]
    pub sync_enabled: bool,
    /// Number of transactions between automatic sync control events.
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u32,
    /// Symbolic name of the partitioner to build from the registry.
    #[serde(default = "default_partitioner")]
    pub partitioner: String,
}

impl DispatchConfig {
    /// Default number of partitions.
    pub const DEFAULT_PARTITIONS: u32 = 1;

    /// Default capacity of each partition's data queue.
    pub const DEFAULT_MAX_SIZE: usize = 100;

    /// Default capacity of each partition's control-event queue.
    pub const DEFAULT_MAX_CONTROL_EVENTS: usize = 1000;

    /// Default bound on pending critical sections.
    pub const DEFAULT_MAX_CRITICAL_SECTIONS: usize = 1000;

    /// Default number of transactions between sync control events.
    pub const DEFAULT_SYNC_INTERVAL: u32 = 2000;

    /// Default partitioner name.
    pub const DEFAULT_PARTITIONER: &'static str = "shard-hash";

    /// Validates dispatch configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.partitions == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "dispatch.partitions",
                constraint: "must be greater than 0",
            });
        }

        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "dispatch.max_size",
                constraint: "must be greater than 0",
            });
        }

        if self.max_control_events == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "dispatch.max_control_events",
                constraint: "must be greater than 0",
            });
        }

        if self.max_critical_sections == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "dispatch.max_critical_sections",
                constraint: "must be greater than 0",
            });
        }

        if self.sync_interval == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "dispatch.sync_interval",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            max_size: default_max_size(),
            max_control_events: default_max_control_events(),
            max_critical_sections: default_max_critical_sections(),
            sync_enabled: default_sync_enabled(),
            sync_interval: default_sync_interval(),
            partitioner: default_partitioner(),
        }
    }
}

fn default_partitions() -> u32 {
    DispatchConfig::DEFAULT_PARTITIONS
}

fn default_max_size() -> usize {
    DispatchConfig::DEFAULT_MAX_SIZE
}

fn default_max_control_events() -> usize {
    DispatchConfig::DEFAULT_MAX_CONTROL_EVENTS
}

fn default_max_critical_sections() -> usize {
    DispatchConfig::DEFAULT_MAX_CRITICAL_SECTIONS
}

fn default_sync_enabled() -> bool {
    true
}

fn default_sync_interval() -> u32 {
    DispatchConfig::DEFAULT_SYNC_INTERVAL
}

fn default_partitioner() -> String {
    DispatchConfig::DEFAULT_PARTITIONER.to_string()
}

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// How a stage task reacts to an extractor or applier failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Dispatch an error notification and terminate the task.
    #[default]
    Stop,
    /// Log the failure and continue with the next event.
    Warn,
}

/// A contiguous range of seqnos the schedule skips instead of applying.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SkipRange {
    /// First seqno of the range, inclusive.
    pub start_seqno: u64,
    /// Last seqno of the range, inclusive.
    pub end_seqno: u64,
    /// Whether skipping an event in this range forces a position commit.
    #[serde(default)]
    pub commit_at_skip: bool,
}

impl SkipRange {
    /// Returns `true` if the range contains the given seqno.
    pub fn contains(&self, seqno: u64) -> bool {
        self.start_seqno <= seqno && seqno <= self.end_seqno
    }
}

/// Configuration for a single stage task loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StageConfig {
    /// Number of transactions batched into one commit; 1 disables batching.
    #[serde(default = "default_block_commit_rows")]
    pub block_commit_rows: u64,
    /// Reaction to extraction failures.
    #[serde(default)]
    pub extractor_failure_policy: FailurePolicy,
    /// Reaction to application failures.
    #[serde(default)]
    pub applier_failure_policy: FailurePolicy,
    /// Whether the applier keeps the THL position in lockstep with the extractor.
    #[serde(default = "default_sync_thl_with_extractor")]
    pub sync_thl_with_extractor: bool,
    /// Whether the task announces itself as in-sequence on startup.
    #[serde(default)]
    pub auto_sync: bool,
    /// Seqno ranges the schedule skips instead of applying.
    #[serde(default)]
    pub skip_ranges: Vec<SkipRange>,
}

impl StageConfig {
    /// Default number of transactions per block commit.
    pub const DEFAULT_BLOCK_COMMIT_ROWS: u64 = 10;

    /// Validates stage configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.block_commit_rows == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "stage.block_commit_rows",
                constraint: "must be greater than 0",
            });
        }

        for range in &self.skip_ranges {
            if range.start_seqno > range.end_seqno {
                return Err(ValidationError::InvalidSkipRange {
                    start_seqno: range.start_seqno,
                    end_seqno: range.end_seqno,
                });
            }
        }

        Ok(())
    }

    /// Returns `true` if block commit batching is in effect.
    pub fn using_block_commit(&self) -> bool {
        self.block_commit_rows > 1
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            block_commit_rows: default_block_commit_rows(),
            extractor_failure_policy: FailurePolicy::default(),
            applier_failure_policy: FailurePolicy::default(),
            sync_thl_with_extractor: default_sync_thl_with_extractor(),
            auto_sync: false,
            skip_ranges: Vec::new(),
        }
    }
}

fn default_block_commit_rows() -> u64 {
    StageConfig::DEFAULT_BLOCK_COMMIT_ROWS
}

fn default_sync_thl_with_extractor() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StageConfig::default();

        config.validate().unwrap();
        assert!(config.using_block_commit());
    }

    #[test]
    fn single_row_block_disables_batching() {
        let config = StageConfig {
            block_commit_rows: 1,
            ..Default::default()
        };

        assert!(!config.using_block_commit());
    }

    #[test]
    fn inverted_skip_range_is_rejected() {
        let config = StageConfig {
            skip_ranges: vec![SkipRange {
                start_seqno: 10,
                end_seqno: 5,
                commit_at_skip: false,
            }],
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn failure_policy_serialization() {
        let policy: FailurePolicy = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(policy, FailurePolicy::Warn);

        let policy: FailurePolicy = serde_json::from_str("\"stop\"").unwrap();
        assert_eq!(policy, FailurePolicy::Stop);
    }
}

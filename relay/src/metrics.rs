//! Metric names and registration for the replication core.

use metrics::{describe_counter, describe_histogram};

/// Counts data events routed by the dispatch queue.
pub const RELAY_EVENTS_DISPATCHED_TOTAL: &str = "relay_events_dispatched_total";

/// Counts empty events discarded by the dispatch queue.
pub const RELAY_EVENTS_DISCARDED_TOTAL: &str = "relay_events_discarded_total";

/// Counts critical events that forced serialization.
pub const RELAY_SERIALIZATIONS_TOTAL: &str = "relay_serializations_total";

/// Counts events applied by stage tasks.
pub const RELAY_EVENTS_APPLIED_TOTAL: &str = "relay_events_applied_total";

/// Counts commits issued by stage tasks.
pub const RELAY_COMMITS_TOTAL: &str = "relay_commits_total";

/// Counts chunks emitted by the bulk extraction planner.
pub const RELAY_CHUNKS_PLANNED_TOTAL: &str = "relay_chunks_planned_total";

/// Apply-call latency observed by stage tasks, in seconds.
pub const RELAY_APPLY_DURATION_SECONDS: &str = "relay_apply_duration_seconds";

/// Label carrying the partition index.
pub const PARTITION_LABEL: &str = "partition";

/// Label carrying the stage task name.
pub const TASK_LABEL: &str = "task";

/// Label carrying a `schema.table` reference.
pub const TABLE_LABEL: &str = "table";

/// Registers descriptions for all relay metrics.
///
/// Idempotent; call once at service startup.
pub fn register_metrics() {
    describe_counter!(
        RELAY_EVENTS_DISPATCHED_TOTAL,
        "Data events routed to partition readers"
    );
    describe_counter!(
        RELAY_EVENTS_DISCARDED_TOTAL,
        "Empty events discarded before routing"
    );
    describe_counter!(
        RELAY_SERIALIZATIONS_TOTAL,
        "Critical events that forced cross-partition serialization"
    );
    describe_counter!(RELAY_EVENTS_APPLIED_TOTAL, "Events applied by stage tasks");
    describe_counter!(RELAY_COMMITS_TOTAL, "Commits issued by stage tasks");
    describe_counter!(
        RELAY_CHUNKS_PLANNED_TOTAL,
        "Chunks emitted by the bulk extraction planner"
    );
    describe_histogram!(
        RELAY_APPLY_DURATION_SECONDS,
        "Apply-call latency observed by stage tasks"
    );
}

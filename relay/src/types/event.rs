use std::collections::BTreeMap;

use crate::types::Header;

/// Metadata keys recognized by the replication core.
///
/// Metadata is an open string map stamped by the upstream decoder; the core
/// only interprets the keys below.
pub mod opts {
    /// Marks an event emitted by the heartbeat mechanism.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Marks a transaction that rolls back at its end.
    pub const ROLLBACK: &str = "rollback";
    /// Marks an event that must not share a commit block with others.
    pub const UNSAFE_FOR_BLOCK_COMMIT: &str = "unsafe_for_block_commit";
    /// Names the logical service the event belongs to.
    pub const SERVICE: &str = "service";
    /// Shard key used by the default partitioner.
    pub const SHARD_ID: &str = "shard";

    /// Shard marker for events that affect every shard and must serialize.
    pub const GLOBAL_SHARD: &str = "#global";
}

/// A batch of row images captured for a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBatch {
    /// Schema the table belongs to.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Row values, one vector of column values per row.
    pub rows: Vec<Vec<String>>,
}

/// One element of an event payload.
///
/// The core treats payloads as opaque; appliers interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    /// Statement-based capture: a SQL string.
    Statement(String),
    /// Row-based capture: row images for a single table.
    Rows(RowBatch),
}

/// An ordered batch of row changes or a SQL statement with metadata.
///
/// Events arrive from the upstream extractor with strictly increasing
/// `(seqno, fragno)` tuples. Within one seqno the fragnos form a gap-free
/// `0..F` prefix and exactly one fragment, the one with the maximum fragno,
/// carries `last_frag = true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbmsEvent {
    /// Globally increasing transaction sequence number.
    pub seqno: u64,
    /// Intra-transaction fragment index.
    pub fragno: u32,
    /// Whether this fragment closes its transaction.
    pub last_frag: bool,
    /// Opaque upstream position string.
    pub event_id: String,
    /// Identifier of the upstream server the event originated from.
    pub source_id: String,
    /// Logical service the event belongs to, from the `service` metadata key.
    pub service: String,
    /// Open metadata map stamped by the upstream decoder.
    pub metadata: BTreeMap<String, String>,
    /// Opaque payload; an empty payload marks a discardable event.
    pub payload: Vec<EventData>,
}

impl DbmsEvent {
    /// Builds the restart header for this event.
    pub fn header(&self) -> Header {
        Header {
            seqno: self.seqno,
            fragno: self.fragno,
            last_frag: self.last_frag,
            event_id: self.event_id.clone(),
            source_id: self.source_id.clone(),
        }
    }

    /// Returns `true` when the payload is empty and the event is discardable.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns `true` when the event was emitted by the heartbeat mechanism.
    pub fn is_heartbeat(&self) -> bool {
        self.metadata.contains_key(opts::HEARTBEAT)
    }

    /// Returns `true` when the transaction rolls back at its end.
    pub fn is_rollback(&self) -> bool {
        self.metadata.contains_key(opts::ROLLBACK)
    }

    /// Returns `true` when the event must not share a commit block.
    pub fn is_unsafe_for_block_commit(&self) -> bool {
        self.metadata.contains_key(opts::UNSAFE_FOR_BLOCK_COMMIT)
    }

    /// Returns the shard key used for partitioning, if present.
    pub fn shard_id(&self) -> Option<&str> {
        self.metadata.get(opts::SHARD_ID).map(String::as_str)
    }
}

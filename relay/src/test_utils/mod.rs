//! Builders and helpers shared by unit and integration tests.

use std::collections::BTreeMap;

use crate::types::{ControlEvent, ControlKind, DbmsEvent, EventData, RowBatch, opts};

/// A single-fragment committed transaction at the given seqno.
pub fn transaction(seqno: u64) -> DbmsEvent {
    fragment(seqno, 0, true)
}

/// One fragment of a transaction.
pub fn fragment(seqno: u64, fragno: u32, last_frag: bool) -> DbmsEvent {
    DbmsEvent {
        seqno,
        fragno,
        last_frag,
        event_id: format!("binlog.000001:{:08}", seqno * 1000 + u64::from(fragno)),
        source_id: "upstream-1".to_string(),
        service: "default".to_string(),
        metadata: BTreeMap::new(),
        payload: vec![EventData::Rows(RowBatch {
            schema: "app".to_string(),
            table: "orders".to_string(),
            rows: vec![vec![seqno.to_string(), "pending".to_string()]],
        })],
    }
}

/// A committed transaction carrying a shard key.
pub fn event_with_shard(seqno: u64, shard: &str) -> DbmsEvent {
    let mut event = transaction(seqno);
    event
        .metadata
        .insert(opts::SHARD_ID.to_string(), shard.to_string());
    event
}

/// A committed transaction tagged as a heartbeat.
pub fn heartbeat(seqno: u64) -> DbmsEvent {
    let mut event = transaction(seqno);
    event
        .metadata
        .insert(opts::HEARTBEAT.to_string(), "relay_heartbeat".to_string());
    event
}

/// A committed transaction with an empty payload.
pub fn empty_event(seqno: u64) -> DbmsEvent {
    let mut event = transaction(seqno);
    event.payload.clear();
    event
}

/// A committed transaction belonging to a named service.
pub fn service_transaction(seqno: u64, service: &str) -> DbmsEvent {
    let mut event = transaction(seqno);
    event.service = service.to_string();
    event
        .metadata
        .insert(opts::SERVICE.to_string(), service.to_string());
    event
}

/// A bare control event without a header.
pub fn control(kind: ControlKind, seqno: u64) -> ControlEvent {
    ControlEvent::after(kind, seqno, None)
}

/// Initializes a tracing subscriber for tests; safe to call repeatedly.
#[cfg(test)]
pub fn init_test_tracing() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

use crate::types::Header;

/// A predicate over restart headers used for watch synchronization.
///
/// Watch predicates are registered with the dispatch queue and evaluated at
/// transaction boundaries; a match triggers a sync control event broadcast so
/// every partition observes the watched position. The schedule uses the same
/// predicates as stop watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPredicate {
    /// Matches the first header whose seqno is at least the given value.
    SeqnoAtLeast(u64),
    /// Matches the header carrying exactly this upstream event id.
    EventId(String),
}

impl WatchPredicate {
    /// Returns `true` when the header satisfies the predicate.
    pub fn matches(&self, header: &Header) -> bool {
        match self {
            WatchPredicate::SeqnoAtLeast(seqno) => header.seqno >= *seqno,
            WatchPredicate::EventId(event_id) => header.event_id == *event_id,
        }
    }
}

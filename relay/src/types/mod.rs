//! Core data model: log events, control events, and restart headers.

mod control;
mod event;
mod header;
mod watch;

pub use control::{ControlEvent, ControlKind};
pub use event::{DbmsEvent, EventData, RowBatch, opts};
pub use header::Header;
pub use watch::WatchPredicate;

/// A replication event as observed by a stage task.
///
/// Stage tasks consume a merged stream of upstream log events and control
/// events synthesized by the dispatch queue. Control events are position
/// updates, never data.
#[derive(Debug, Clone)]
pub enum StageEvent {
    /// A data-bearing log event extracted upstream.
    Data(DbmsEvent),
    /// An out-of-band marker synthesized by the dispatch queue.
    Control(ControlEvent),
}

impl StageEvent {
    /// Returns the seqno this event is positioned at.
    pub fn seqno(&self) -> u64 {
        match self {
            StageEvent::Data(event) => event.seqno,
            StageEvent::Control(control) => control.seqno,
        }
    }

    /// Returns a restart header for this event, when one is available.
    ///
    /// Control events carry the header of the log event they were injected
    /// after; a control injected into an empty stream has none.
    pub fn header(&self) -> Option<Header> {
        match self {
            StageEvent::Data(event) => Some(event.header()),
            StageEvent::Control(control) => control.header.clone(),
        }
    }
}

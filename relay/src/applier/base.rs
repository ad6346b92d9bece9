use std::future::Future;

use crate::error::RelayResult;
use crate::types::{DbmsEvent, Header};

/// A contiguous range of events suppressed by the filter chain.
///
/// Delivered once to the applier when the next unsuppressed event arrives so
/// the persisted restart position advances across the gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredRange {
    /// Header of the first suppressed event.
    pub first: Header,
    /// Header of the last suppressed event.
    pub last: Header,
}

/// Sink for replicated events on the downstream side of a stage.
///
/// Appliers own the downstream transaction: the stage loop decides when to
/// commit (block-commit batching) and when to roll back, and the applier
/// executes those decisions. The restart header persisted through
/// [`Applier::update_position`] and committed applies is the only
/// persistence-relevant export of the core.
pub trait Applier: Send {
    /// Applies one event, optionally committing or rolling back afterwards.
    ///
    /// `sync_thl_with_extractor` asks the applier to keep the THL position in
    /// lockstep with the extractor when both live in the same process.
    fn apply(
        &mut self,
        event: &DbmsEvent,
        commit: bool,
        rollback: bool,
        sync_thl_with_extractor: bool,
    ) -> impl Future<Output = RelayResult<()>> + Send;

    /// Records a range of filtered events; an implied commit advances the
    /// restart position past the gap.
    fn apply_filtered_range(
        &mut self,
        range: FilteredRange,
    ) -> impl Future<Output = RelayResult<()>> + Send;

    /// Commits all work applied since the previous commit.
    fn commit(&mut self) -> impl Future<Output = RelayResult<()>> + Send;

    /// Rolls back any open transaction.
    fn rollback(&mut self) -> impl Future<Output = RelayResult<()>> + Send;

    /// Updates the persisted position without applying data.
    ///
    /// `commit` forces the position to durable storage; `recoverable` marks
    /// positions that may be rewound on restart.
    fn update_position(
        &mut self,
        header: Header,
        commit: bool,
        recoverable: bool,
    ) -> impl Future<Output = RelayResult<()>> + Send;
}

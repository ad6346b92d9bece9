use std::future::Future;

use crate::error::RelayResult;
use crate::types::StageEvent;

/// Source of events for a stage task.
///
/// Extractors wrap whatever feeds a stage: the upstream binary-log decoder,
/// a THL cursor, or a partition reader of the dispatch fan-out. `None` from
/// [`Extractor::extract`] means "nothing right now, poll again"; errors are
/// typed and policy-gated by the stage loop.
pub trait Extractor: Send {
    /// Pulls the next event, awaiting until one is available.
    fn extract(&mut self) -> impl Future<Output = RelayResult<Option<StageEvent>>> + Send;

    /// Returns `true` when more events are already buffered.
    ///
    /// The stage loop consults this to decide whether a block commit can be
    /// deferred; it must not block.
    fn has_more(&self) -> bool;
}

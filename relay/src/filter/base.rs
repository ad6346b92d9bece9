use crate::error::RelayResult;
use crate::types::DbmsEvent;

/// A single element of a stage's filter chain.
///
/// Filters run in order between extraction and apply. Returning `None`
/// suppresses the event; the stage loop records suppressed ranges so restart
/// positions still advance monotonically. A filter that fails is escalated
/// as an application-class error.
pub trait Filter: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transforms the event, or suppresses it by returning `None`.
    fn filter(&mut self, event: DbmsEvent) -> RelayResult<Option<DbmsEvent>>;
}

use std::collections::VecDeque;

use crate::error::RelayResult;
use crate::extractor::Extractor;
use crate::types::StageEvent;

/// In-memory extractor serving a fixed sequence of events.
///
/// Useful for tests and for replaying a captured stream; the real system
/// binds stage tasks to partition readers or to an upstream decoder.
#[derive(Debug, Default)]
pub struct MemoryExtractor {
    events: VecDeque<StageEvent>,
}

impl MemoryExtractor {
    /// Creates an extractor over the given events, served in order.
    pub fn new(events: impl IntoIterator<Item = StageEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Appends an event to the end of the stream.
    pub fn push(&mut self, event: StageEvent) {
        self.events.push_back(event);
    }
}

impl Extractor for MemoryExtractor {
    async fn extract(&mut self) -> RelayResult<Option<StageEvent>> {
        Ok(self.events.pop_front())
    }

    fn has_more(&self) -> bool {
        !self.events.is_empty()
    }
}

use std::ops::RangeInclusive;

use tracing::debug;

use crate::error::RelayResult;
use crate::filter::Filter;
use crate::types::DbmsEvent;

/// Suppresses every event inside a seqno range.
///
/// Used to skip a span of transactions that were already applied out of band,
/// for example after a manual repair on the target.
#[derive(Debug)]
pub struct SeqnoRangeFilter {
    suppress: RangeInclusive<u64>,
}

impl SeqnoRangeFilter {
    pub fn new(suppress: RangeInclusive<u64>) -> Self {
        Self { suppress }
    }
}

impl Filter for SeqnoRangeFilter {
    fn name(&self) -> &str {
        "seqno-range"
    }

    fn filter(&mut self, event: DbmsEvent) -> RelayResult<Option<DbmsEvent>> {
        if self.suppress.contains(&event.seqno) {
            debug!(seqno = event.seqno, "suppressing event inside range");
            return Ok(None);
        }

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transaction;

    #[test]
    fn suppresses_only_events_inside_the_range() {
        let mut filter = SeqnoRangeFilter::new(5..=7);

        assert!(filter.filter(transaction(4)).unwrap().is_some());
        assert!(filter.filter(transaction(5)).unwrap().is_none());
        assert!(filter.filter(transaction(7)).unwrap().is_none());
        assert!(filter.filter(transaction(8)).unwrap().is_some());
    }
}

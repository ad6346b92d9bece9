use std::sync::{Arc, Mutex};

use crate::applier::{Applier, FilteredRange};
use crate::error::RelayResult;
use crate::types::{DbmsEvent, Header};

/// One call observed by a [`MemoryApplier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplierCall {
    Apply {
        seqno: u64,
        fragno: u32,
        commit: bool,
        rollback: bool,
    },
    ApplyFilteredRange {
        first_seqno: u64,
        last_seqno: u64,
    },
    Commit,
    Rollback,
    UpdatePosition {
        seqno: u64,
        commit: bool,
    },
}

#[derive(Debug, Default)]
struct MemoryApplierState {
    calls: Vec<ApplierCall>,
    /// Header applied or positioned but not yet made durable by a commit.
    uncommitted: Option<Header>,
    /// Header of the most recently committed event: the restart point.
    committed: Option<Header>,
}

impl MemoryApplierState {
    fn settle(&mut self, header: Header, commit: bool) {
        if commit {
            self.committed = Some(header);
            self.uncommitted = None;
        } else {
            self.uncommitted = Some(header);
        }
    }
}

/// In-memory applier that records every call it receives.
///
/// Serves as the reference implementation of the commit contract: the
/// restart header it exposes is always the most recently committed event,
/// never an uncommitted one. Tests use it to assert on exact call sequences.
#[derive(Debug, Clone, Default)]
pub struct MemoryApplier {
    state: Arc<Mutex<MemoryApplierState>>,
}

impl MemoryApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all calls observed so far.
    pub fn calls(&self) -> Vec<ApplierCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Returns the restart header: the most recently committed event.
    pub fn committed_header(&self) -> Option<Header> {
        self.state.lock().unwrap().committed.clone()
    }
}

impl Applier for MemoryApplier {
    async fn apply(
        &mut self,
        event: &DbmsEvent,
        commit: bool,
        rollback: bool,
        _sync_thl_with_extractor: bool,
    ) -> RelayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApplierCall::Apply {
            seqno: event.seqno,
            fragno: event.fragno,
            commit,
            rollback,
        });

        if rollback {
            state.uncommitted = None;
        } else {
            state.settle(event.header(), commit);
        }

        Ok(())
    }

    async fn apply_filtered_range(&mut self, range: FilteredRange) -> RelayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApplierCall::ApplyFilteredRange {
            first_seqno: range.first.seqno,
            last_seqno: range.last.seqno,
        });
        state.settle(range.last, true);

        Ok(())
    }

    async fn commit(&mut self) -> RelayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApplierCall::Commit);

        if let Some(header) = state.uncommitted.take() {
            state.committed = Some(header);
        }

        Ok(())
    }

    async fn rollback(&mut self) -> RelayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApplierCall::Rollback);
        state.uncommitted = None;

        Ok(())
    }

    async fn update_position(
        &mut self,
        header: Header,
        commit: bool,
        _recoverable: bool,
    ) -> RelayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApplierCall::UpdatePosition {
            seqno: header.seqno,
            commit,
        });
        state.settle(header, commit);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::transaction;

    #[tokio::test]
    async fn committed_header_tracks_only_committed_events() {
        let mut applier = MemoryApplier::new();

        applier
            .apply(&transaction(1), false, false, true)
            .await
            .unwrap();
        assert!(applier.committed_header().is_none());

        applier.commit().await.unwrap();
        assert_eq!(applier.committed_header().unwrap().seqno, 1);

        applier
            .apply(&transaction(2), true, false, true)
            .await
            .unwrap();
        assert_eq!(applier.committed_header().unwrap().seqno, 2);
    }

    #[tokio::test]
    async fn rollback_discards_uncommitted_work() {
        let mut applier = MemoryApplier::new();

        applier
            .apply(&transaction(3), false, false, true)
            .await
            .unwrap();
        applier.rollback().await.unwrap();
        applier.commit().await.unwrap();

        assert!(applier.committed_header().is_none());
    }
}

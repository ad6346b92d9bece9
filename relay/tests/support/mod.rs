//! Shared helpers for integration tests.
//!
//! Each test binary compiles its own copy, so not every helper is used
//! everywhere.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};

use relay::applier::{Applier, ApplierCall, FilteredRange, MemoryApplier};
use relay::bail;
use relay::error::{ErrorKind, RelayResult};
use relay::extractor::Extractor;
use relay::relay_error;
use relay::types::{
    ControlEvent, ControlKind, DbmsEvent, EventData, Header, RowBatch, StageEvent, opts,
};

/// Initializes a tracing subscriber once per test binary.
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
    with_metadata(transaction(seqno), opts::SHARD_ID, shard)
}

/// A committed transaction tagged as a heartbeat.
pub fn heartbeat(seqno: u64) -> DbmsEvent {
    with_metadata(transaction(seqno), opts::HEARTBEAT, "relay_heartbeat")
}

/// A committed transaction with an empty payload.
pub fn empty_event(seqno: u64) -> DbmsEvent {
    let mut event = transaction(seqno);
    event.payload.clear();
    event
}

/// A committed transaction belonging to a named service.
pub fn service_transaction(seqno: u64, service: &str) -> DbmsEvent {
    let mut event = with_metadata(transaction(seqno), opts::SERVICE, service);
    event.service = service.to_string();
    event
}

/// Adds one metadata entry to an event.
pub fn with_metadata(mut event: DbmsEvent, key: &str, value: &str) -> DbmsEvent {
    event.metadata.insert(key.to_string(), value.to_string());
    event
}

/// One scripted step served by a [`ScriptedExtractor`].
pub enum Step {
    Event(StageEvent),
    Error,
    EmptyPoll,
}

impl Step {
    pub fn data(event: DbmsEvent) -> Self {
        Step::Event(StageEvent::Data(event))
    }
}

/// Extractor replaying a fixed script of events, errors, and empty polls.
///
/// With `stop_when_drained`, a synthetic stop control event follows the last
/// scripted step so the stage loop terminates cleanly.
pub struct ScriptedExtractor {
    steps: VecDeque<Step>,
    stop_when_drained: bool,
    stop_emitted: bool,
    last_seqno: u64,
}

impl ScriptedExtractor {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            stop_when_drained: false,
            stop_emitted: false,
            last_seqno: 0,
        }
    }

    /// Serves the given events in order, then a stop control event.
    pub fn stopping_after(events: impl IntoIterator<Item = DbmsEvent>) -> Self {
        Self::stopping_after_steps(events.into_iter().map(Step::data))
    }

    /// Serves the given steps in order, then a stop control event.
    pub fn stopping_after_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let mut extractor = Self::new(steps);
        extractor.stop_when_drained = true;
        extractor
    }
}

impl Extractor for ScriptedExtractor {
    async fn extract(&mut self) -> RelayResult<Option<StageEvent>> {
        match self.steps.pop_front() {
            Some(Step::Event(event)) => {
                self.last_seqno = self.last_seqno.max(event.seqno());
                Ok(Some(event))
            }
            Some(Step::Error) => Err(relay_error!(
                ErrorKind::ExtractionFailed,
                "Scripted extraction failure"
            )),
            Some(Step::EmptyPoll) => Ok(None),
            None if self.stop_when_drained && !self.stop_emitted => {
                self.stop_emitted = true;
                Ok(Some(StageEvent::Control(ControlEvent::after(
                    ControlKind::Stop,
                    self.last_seqno,
                    None,
                ))))
            }
            None => Ok(None),
        }
    }

    fn has_more(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, Step::Event(_)))
    }
}

/// Extractor that never yields; used to test cancellation of a suspension.
pub struct PendingExtractor;

impl Extractor for PendingExtractor {
    async fn extract(&mut self) -> RelayResult<Option<StageEvent>> {
        std::future::pending::<()>().await;
        Ok(None)
    }

    fn has_more(&self) -> bool {
        false
    }
}

/// Applier that fails for configured seqnos and records everything else.
#[derive(Clone)]
pub struct FlakyApplier {
    pub inner: MemoryApplier,
    fail_seqnos: HashSet<u64>,
}

impl FlakyApplier {
    pub fn failing_on(seqnos: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner: MemoryApplier::new(),
            fail_seqnos: seqnos.into_iter().collect(),
        }
    }

    pub fn calls(&self) -> Vec<ApplierCall> {
        self.inner.calls()
    }

    pub fn committed_header(&self) -> Option<Header> {
        self.inner.committed_header()
    }
}

impl Applier for FlakyApplier {
    async fn apply(
        &mut self,
        event: &DbmsEvent,
        commit: bool,
        rollback: bool,
        sync_thl_with_extractor: bool,
    ) -> RelayResult<()> {
        if self.fail_seqnos.contains(&event.seqno) {
            bail!(
                ErrorKind::ApplyFailed,
                "Scripted apply failure",
                format!("seqno={}", event.seqno)
            );
        }

        self.inner
            .apply(event, commit, rollback, sync_thl_with_extractor)
            .await
    }

    async fn apply_filtered_range(&mut self, range: FilteredRange) -> RelayResult<()> {
        self.inner.apply_filtered_range(range).await
    }

    async fn commit(&mut self) -> RelayResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> RelayResult<()> {
        self.inner.rollback().await
    }

    async fn update_position(
        &mut self,
        header: Header,
        commit: bool,
        recoverable: bool,
    ) -> RelayResult<()> {
        self.inner.update_position(header, commit, recoverable).await
    }
}

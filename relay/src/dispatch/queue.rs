//! The parallel dispatch queue: single producer, N partition consumers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use metrics::counter;
use relay_config::shared::DispatchConfig;
use tracing::debug;

use crate::bail;
use crate::concurrency::seqno::SeqnoCounter;
use crate::dispatch::critical::{CriticalSection, CriticalSectionTracker};
use crate::dispatch::partitioner::Partitioner;
use crate::dispatch::reader::{PartitionReader, PartitionSender, create_partition_lane};
use crate::error::{ErrorKind, RelayResult};
use crate::metrics::{
    PARTITION_LABEL, RELAY_EVENTS_DISCARDED_TOTAL, RELAY_EVENTS_DISPATCHED_TOTAL,
    RELAY_SERIALIZATIONS_TOTAL,
};
use crate::types::{ControlEvent, ControlKind, DbmsEvent, Header, WatchPredicate};

/// Counters shared between the producer and status readers.
#[derive(Debug, Default)]
struct DispatchStats {
    transactions: AtomicU64,
    serializations: AtomicU64,
    discards: AtomicU64,
    stop_requested: AtomicBool,
}

/// Ingests a totally-ordered event stream and fans it out to N partitions.
///
/// The queue is the single producer for every partition lane. It routes data
/// events through the configured partitioner, tracks critical sections so
/// shard-affecting events serialize globally, and injects control events at
/// aligned points to keep partitions loosely synchronized.
///
/// `put` must be called in upstream order: events arrive with strictly
/// increasing `(seqno, fragno)` tuples.
pub struct ParallelDispatchQueue {
    config: Arc<DispatchConfig>,
    senders: Vec<PartitionSender>,
    partitioner: Arc<dyn Partitioner>,
    head: SeqnoCounter,
    sections: Arc<CriticalSectionTracker>,
    pending_section: Option<CriticalSection>,
    watch_predicates: Vec<WatchPredicate>,
    last_inserted: Option<Header>,
    last_position: Option<(u64, u32)>,
    sync_counter: u32,
    stats: Arc<DispatchStats>,
}

impl ParallelDispatchQueue {
    /// Builds the queue and one reader per partition.
    ///
    /// The returned readers are handed to the partition stage tasks; the
    /// queue keeps the producer halves.
    pub fn new(
        config: DispatchConfig,
        partitioner: Arc<dyn Partitioner>,
    ) -> (Self, Vec<PartitionReader>) {
        let head = SeqnoCounter::new(0);
        let sections = Arc::new(CriticalSectionTracker::new(
            config.partitions,
            config.max_critical_sections,
        ));

        let mut senders = Vec::with_capacity(config.partitions as usize);
        let mut readers = Vec::with_capacity(config.partitions as usize);
        for partition in 0..config.partitions {
            let (sender, reader) = create_partition_lane(
                partition,
                partitioner.clone(),
                head.clone(),
                sections.clone(),
                config.max_size,
                config.max_control_events,
            );
            senders.push(sender);
            readers.push(reader);
        }

        let queue = Self {
            config: Arc::new(config),
            senders,
            partitioner,
            head,
            sections,
            pending_section: None,
            watch_predicates: Vec::new(),
            last_inserted: None,
            last_position: None,
            sync_counter: 0,
            stats: Arc::new(DispatchStats::default()),
        };

        (queue, readers)
    }

    /// Returns the shared head seqno counter.
    pub fn head(&self) -> &SeqnoCounter {
        &self.head
    }

    /// Ingests the next event from the upstream extractor.
    ///
    /// Blocks while the target partition's queue is full. Fails with
    /// `Cancelled` when consumers are gone and with `InvariantViolation` on
    /// impossible states: seqno regress, an out-of-range partition, or a
    /// critical-section queue overflow.
    pub async fn put(&mut self, event: DbmsEvent) -> RelayResult<()> {
        debug!(
            seqno = event.seqno,
            fragno = event.fragno,
            last_frag = event.last_frag,
            "received event"
        );

        if let Some((last_seqno, last_fragno)) = self.last_position
            && (event.seqno, event.fragno) <= (last_seqno, last_fragno)
        {
            bail!(
                ErrorKind::InvariantViolation,
                "Event position went backward",
                format!(
                    "seqno={} fragno={} last_seqno={last_seqno} last_fragno={last_fragno}",
                    event.seqno, event.fragno
                )
            );
        }
        self.last_position = Some((event.seqno, event.fragno));

        if event.last_frag {
            self.stats.transactions.fetch_add(1, Ordering::Relaxed);
        }

        // Empty events carry no work for any partition.
        if event.is_empty() {
            self.stats.discards.fetch_add(1, Ordering::Relaxed);
            counter!(RELAY_EVENTS_DISCARDED_TOTAL).increment(1);
            self.head.set(event.seqno);
            return Ok(());
        }

        let response = self.partitioner.partition(&event, 0)?;
        if response.partition >= self.config.partitions {
            bail!(
                ErrorKind::InvariantViolation,
                "Partitioner returned an out-of-range partition",
                format!(
                    "partition={} partitions={}",
                    response.partition, self.config.partitions
                )
            );
        }

        self.track_critical_section(event.seqno, response.partition, response.critical)?;

        let header = event.header();
        let is_heartbeat = event.is_heartbeat();

        self.senders[response.partition as usize]
            .put_event(event)
            .await?;
        counter!(
            RELAY_EVENTS_DISPATCHED_TOTAL,
            PARTITION_LABEL => response.partition.to_string(),
        )
        .increment(1);

        // Advancing the head is what lets eligible readers proceed.
        self.head.set(header.seqno);
        self.last_inserted = Some(header.clone());

        self.inject_controls(header, is_heartbeat).await?;

        Ok(())
    }

    /// Requests a stop control event at the next transaction boundary.
    ///
    /// When the stream already sits at a boundary the stop is broadcast
    /// immediately at the current position.
    pub async fn insert_stop_event(&mut self) -> RelayResult<()> {
        match &self.last_inserted {
            Some(header) if !header.last_frag => {
                self.stats.stop_requested.store(true, Ordering::Relaxed);
                debug!("stop requested mid-transaction, deferring to next boundary");
            }
            last_inserted => {
                let seqno = last_inserted
                    .as_ref()
                    .map(|header| header.seqno)
                    .unwrap_or_else(|| self.head.get());
                self.broadcast_control(ControlKind::Stop, seqno, last_inserted.clone())
                    .await?;
            }
        }

        Ok(())
    }

    /// Registers a watch predicate evaluated at transaction boundaries.
    ///
    /// A match triggers a sync control broadcast and removes the predicate.
    pub fn insert_watch_sync_event(&mut self, predicate: WatchPredicate) {
        self.watch_predicates.push(predicate);
    }

    /// Returns a point-in-time snapshot of queue state and counters.
    pub fn status(&self) -> BTreeMap<String, String> {
        let mut status = BTreeMap::new();

        status.insert("head_seqno".to_string(), self.head.get().to_string());
        status.insert("max_size".to_string(), self.config.max_size.to_string());
        status.insert(
            "event_count".to_string(),
            self.stats
                .transactions
                .load(Ordering::Relaxed)
                .to_string(),
        );
        status.insert(
            "discard_count".to_string(),
            self.stats.discards.load(Ordering::Relaxed).to_string(),
        );
        status.insert("queues".to_string(), self.config.partitions.to_string());
        status.insert(
            "sync_enabled".to_string(),
            self.config.sync_enabled.to_string(),
        );
        status.insert(
            "sync_interval".to_string(),
            self.config.sync_interval.to_string(),
        );

        let critical_partition = self
            .sections
            .serializing_partition()
            .or(self.pending_section.as_ref().map(|s| s.partition));
        status.insert(
            "serialized".to_string(),
            critical_partition.is_some().to_string(),
        );
        status.insert(
            "serialization_count".to_string(),
            self.stats
                .serializations
                .load(Ordering::Relaxed)
                .to_string(),
        );
        status.insert(
            "stop_requested".to_string(),
            self.stats.stop_requested.load(Ordering::Relaxed).to_string(),
        );
        status.insert(
            "critical_partition".to_string(),
            critical_partition
                .map(|partition| partition.to_string())
                .unwrap_or_else(|| "-1".to_string()),
        );

        for sender in &self.senders {
            status.insert(
                format!("store.{}", sender.partition()),
                format!(
                    "partition={} queued_events={} queued_controls={}",
                    sender.partition(),
                    sender.queued_events(),
                    sender.queued_controls()
                ),
            );
        }

        status
    }

    /// Advances the critical-section state machine for one routed event.
    fn track_critical_section(
        &mut self,
        seqno: u64,
        partition: u32,
        critical: bool,
    ) -> RelayResult<()> {
        if critical {
            self.stats.serializations.fetch_add(1, Ordering::Relaxed);
            counter!(RELAY_SERIALIZATIONS_TOTAL).increment(1);

            match self.pending_section.take() {
                // A critical section is starting.
                None => {
                    self.pending_section = Some(CriticalSection::starting_at(partition, seqno));
                }
                // Continuing in the same critical section.
                Some(mut section) if section.partition == partition => {
                    section.end_seqno = seqno;
                    self.pending_section = Some(section);
                }
                // Switching between critical sections: close the previous one
                // and start a new one.
                Some(finished) => {
                    self.sections.enqueue(finished)?;
                    self.pending_section = Some(CriticalSection::starting_at(partition, seqno));
                }
            }
        } else if let Some(finished) = self.pending_section.take() {
            // The critical section has ended; readers may only pass it once
            // it retires.
            self.sections.enqueue(finished)?;
        }

        Ok(())
    }

    /// Post-event control injection: stop fulfillment, watch predicates,
    /// interval syncs, and heartbeat syncs.
    ///
    /// All triggers are evaluated only at transaction boundaries.
    async fn inject_controls(&mut self, header: Header, is_heartbeat: bool) -> RelayResult<()> {
        if !header.last_frag {
            return Ok(());
        }

        let seqno = header.seqno;
        let mut needs_sync = false;

        if self.stats.stop_requested.swap(false, Ordering::Relaxed) {
            self.broadcast_control(ControlKind::Stop, seqno, Some(header.clone()))
                .await?;
            debug!(seqno, "added stop control event");
        }

        if !self.watch_predicates.is_empty() {
            let before = self.watch_predicates.len();
            self.watch_predicates
                .retain(|predicate| !predicate.matches(&header));
            if self.watch_predicates.len() != before {
                needs_sync = true;
            }
        }

        if self.config.sync_enabled {
            self.sync_counter += 1;
            if self.sync_counter >= self.config.sync_interval {
                needs_sync = true;
                self.sync_counter = 0;
            }
        }

        if is_heartbeat {
            needs_sync = true;
        }

        if needs_sync {
            self.broadcast_control(ControlKind::Sync, seqno, Some(header))
                .await?;
            debug!(seqno, "added sync control event");
        }

        Ok(())
    }

    /// Pushes a control event into every reader's control queue.
    ///
    /// Ordering across readers is not synchronized, but each reader
    /// individually observes controls in broadcast order.
    async fn broadcast_control(
        &self,
        kind: ControlKind,
        seqno: u64,
        header: Option<Header>,
    ) -> RelayResult<()> {
        let control = ControlEvent::after(kind, seqno, header);
        for sender in &self.senders {
            sender.put_control(control.clone()).await?;
        }

        Ok(())
    }
}

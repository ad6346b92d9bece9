//! Per-partition reader: one bounded lane of the dispatch fan-out.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use crate::bail;
use crate::concurrency::seqno::SeqnoCounter;
use crate::dispatch::critical::CriticalSectionTracker;
use crate::dispatch::partitioner::Partitioner;
use crate::error::{ErrorKind, RelayResult};
use crate::extractor::Extractor;
use crate::types::{ControlEvent, DbmsEvent, StageEvent};

/// Producer half of a partition lane, held by the dispatch queue.
#[derive(Clone)]
pub struct PartitionSender {
    partition: u32,
    partitioner: Arc<dyn Partitioner>,
    data_tx: mpsc::Sender<DbmsEvent>,
    control_tx: mpsc::Sender<ControlEvent>,
}

impl PartitionSender {
    /// Offers a data event to this partition.
    ///
    /// The event is enqueued only when the partitioner routes it here;
    /// otherwise it is dropped. Blocks while the data queue is full.
    pub async fn put_event(&self, event: DbmsEvent) -> RelayResult<()> {
        let response = self.partitioner.partition(&event, self.partition)?;
        if response.partition != self.partition {
            debug!(
                seqno = event.seqno,
                partition = self.partition,
                routed = response.partition,
                "event not routed to this partition, dropping"
            );
            return Ok(());
        }

        if self.data_tx.send(event).await.is_err() {
            bail!(
                ErrorKind::Cancelled,
                "Partition reader is gone, cannot enqueue event",
                format!("partition={}", self.partition)
            );
        }

        Ok(())
    }

    /// Enqueues a control event unconditionally.
    ///
    /// Blocks while the control queue is full.
    pub async fn put_control(&self, control: ControlEvent) -> RelayResult<()> {
        if self.control_tx.send(control).await.is_err() {
            bail!(
                ErrorKind::Cancelled,
                "Partition reader is gone, cannot enqueue control event",
                format!("partition={}", self.partition)
            );
        }

        Ok(())
    }

    /// Returns the number of data events currently queued.
    pub fn queued_events(&self) -> usize {
        self.data_tx.max_capacity() - self.data_tx.capacity()
    }

    /// Returns the number of control events currently queued.
    pub fn queued_controls(&self) -> usize {
        self.control_tx.max_capacity() - self.control_tx.capacity()
    }

    /// Returns the partition index of this lane.
    pub fn partition(&self) -> u32 {
        self.partition
    }
}

/// Which queue the next merged item comes from.
enum Next {
    Data,
    Control,
}

/// Consumer half of a partition lane, driven by the partition's stage task.
///
/// `get` merges the data and control queues in seqno order: a control event
/// at seqno S is delivered after every data event below S routed here and
/// before anything above S; on a tie the data event wins. The merge is sound
/// because the single producer enqueues the data event for a seqno before
/// broadcasting any control at that seqno.
pub struct PartitionReader {
    partition: u32,
    data_rx: mpsc::Receiver<DbmsEvent>,
    control_rx: mpsc::Receiver<ControlEvent>,
    peeked_data: Option<DbmsEvent>,
    peeked_control: Option<ControlEvent>,
    data_open: bool,
    control_open: bool,
    head: SeqnoCounter,
    sections: Arc<CriticalSectionTracker>,
}

impl PartitionReader {
    /// Returns the partition index served by this reader.
    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Returns the next event in seqno order, blocking while both queues are
    /// empty and while the critical-section gate is closed.
    pub async fn get(&mut self) -> RelayResult<StageEvent> {
        loop {
            self.fill_peeks().await?;

            let next = match (&self.peeked_data, &self.peeked_control) {
                (Some(data), Some(control)) => {
                    if data.seqno <= control.seqno {
                        Next::Data
                    } else {
                        Next::Control
                    }
                }
                (Some(_), None) => Next::Data,
                (None, Some(_)) => Next::Control,
                (None, None) => continue,
            };

            match next {
                Next::Data => {
                    let Some(event) = self.peeked_data.take() else {
                        continue;
                    };

                    // The dispatcher advances the head after routing; never
                    // deliver ahead of the shared watermark.
                    self.head.wait_until(event.seqno).await?;
                    self.sections.clearance(self.partition, event.seqno).await;
                    self.sections.on_data_delivered(self.partition, event.seqno);

                    return Ok(StageEvent::Data(event));
                }
                Next::Control => {
                    let Some(control) = self.peeked_control.take() else {
                        continue;
                    };

                    self.sections
                        .on_control_delivered(self.partition, control.seqno);

                    return Ok(StageEvent::Control(control));
                }
            }
        }
    }

    /// Returns `true` when an event is already buffered for this partition.
    pub fn has_pending(&self) -> bool {
        self.peeked_data.is_some()
            || self.peeked_control.is_some()
            || !self.data_rx.is_empty()
            || !self.control_rx.is_empty()
    }

    /// Fills the peek slots, awaiting when both queues are empty.
    ///
    /// Ends with a second non-blocking pass: once an item has been observed,
    /// everything the producer sent before it is visible, so the top-up
    /// guarantees the merge never reorders around an in-flight item.
    async fn fill_peeks(&mut self) -> RelayResult<()> {
        self.try_fill();

        if self.peeked_data.is_none() && self.peeked_control.is_none() {
            match (self.data_open, self.control_open) {
                (false, false) => {
                    bail!(
                        ErrorKind::EventStreamClosed,
                        "Both partition queues are closed",
                        format!("partition={}", self.partition)
                    );
                }
                (true, false) => match self.data_rx.recv().await {
                    Some(event) => self.peeked_data = Some(event),
                    None => self.data_open = false,
                },
                (false, true) => match self.control_rx.recv().await {
                    Some(control) => self.peeked_control = Some(control),
                    None => self.control_open = false,
                },
                (true, true) => {
                    tokio::select! {
                        data = self.data_rx.recv() => match data {
                            Some(event) => self.peeked_data = Some(event),
                            None => self.data_open = false,
                        },
                        control = self.control_rx.recv() => match control {
                            Some(control) => self.peeked_control = Some(control),
                            None => self.control_open = false,
                        },
                    }
                }
            }
        }

        self.try_fill();

        Ok(())
    }

    /// Non-blocking fill of both peek slots.
    fn try_fill(&mut self) {
        if self.peeked_data.is_none() && self.data_open {
            match self.data_rx.try_recv() {
                Ok(event) => self.peeked_data = Some(event),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.data_open = false,
            }
        }

        if self.peeked_control.is_none() && self.control_open {
            match self.control_rx.try_recv() {
                Ok(control) => self.peeked_control = Some(control),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.control_open = false,
            }
        }
    }
}

/// A partition reader is directly usable as a stage extractor.
impl Extractor for PartitionReader {
    async fn extract(&mut self) -> RelayResult<Option<StageEvent>> {
        self.get().await.map(Some)
    }

    fn has_more(&self) -> bool {
        self.has_pending()
    }
}

/// Creates one partition lane: a producer half for the dispatch queue and a
/// consumer half for the partition's stage task.
pub fn create_partition_lane(
    partition: u32,
    partitioner: Arc<dyn Partitioner>,
    head: SeqnoCounter,
    sections: Arc<CriticalSectionTracker>,
    max_size: usize,
    max_control_events: usize,
) -> (PartitionSender, PartitionReader) {
    let (data_tx, data_rx) = mpsc::channel(max_size);
    let (control_tx, control_rx) = mpsc::channel(max_control_events);

    let sender = PartitionSender {
        partition,
        partitioner,
        data_tx,
        control_tx,
    };
    let reader = PartitionReader {
        partition,
        data_rx,
        control_rx,
        peeked_data: None,
        peeked_control: None,
        data_open: true,
        control_open: true,
        head,
        sections,
    };

    (sender, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::partitioner::SinglePartitioner;
    use crate::test_utils::{control, transaction};
    use crate::types::ControlKind;
    use std::time::Duration;
    use tokio::time::timeout;

    fn lane(max_size: usize) -> (PartitionSender, PartitionReader) {
        let head = SeqnoCounter::new(0);
        let sections = Arc::new(CriticalSectionTracker::new(1, 16));
        create_partition_lane(
            0,
            Arc::new(SinglePartitioner),
            head,
            sections,
            max_size,
            16,
        )
    }

    #[tokio::test]
    async fn data_and_controls_merge_in_seqno_order() {
        let (sender, mut reader) = lane(16);

        sender.put_event(transaction(1)).await.unwrap();
        sender
            .put_control(control(ControlKind::Sync, 1))
            .await
            .unwrap();
        sender.put_event(transaction(2)).await.unwrap();
        reader.head.set(2);

        // Tie at seqno 1 delivers the data event first.
        let first = reader.get().await.unwrap();
        assert!(matches!(first, StageEvent::Data(ref e) if e.seqno == 1));

        let second = reader.get().await.unwrap();
        assert!(matches!(
            second,
            StageEvent::Control(ref c) if c.seqno == 1 && c.kind == ControlKind::Sync
        ));

        let third = reader.get().await.unwrap();
        assert!(matches!(third, StageEvent::Data(ref e) if e.seqno == 2));
    }

    #[tokio::test]
    async fn control_alone_is_delivered() {
        let (sender, mut reader) = lane(16);

        sender
            .put_control(control(ControlKind::Stop, 4))
            .await
            .unwrap();

        let event = reader.get().await.unwrap();
        assert!(matches!(
            event,
            StageEvent::Control(ref c) if c.kind == ControlKind::Stop
        ));
    }

    #[tokio::test]
    async fn closed_lane_surfaces_end_of_stream() {
        let (sender, mut reader) = lane(16);
        drop(sender);

        let error = reader.get().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::EventStreamClosed);
    }

    #[tokio::test]
    async fn get_blocks_until_an_event_arrives() {
        let (sender, mut reader) = lane(16);
        let head = reader.head.clone();

        let handle = tokio::spawn(async move { reader.get().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.put_event(transaction(1)).await.unwrap();
        head.set(1);

        let event = timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.seqno(), 1);
    }

    #[tokio::test]
    async fn queue_depth_is_observable() {
        let (sender, _reader) = lane(16);

        sender.put_event(transaction(1)).await.unwrap();
        sender.put_event(transaction(2)).await.unwrap();

        assert_eq!(sender.queued_events(), 2);
        assert_eq!(sender.queued_controls(), 0);
    }
}

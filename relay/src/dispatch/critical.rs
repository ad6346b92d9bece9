//! Critical-section bookkeeping for serialized shard processing.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::bail;
use crate::error::{ErrorKind, RelayResult};

/// A contiguous range of seqnos that must execute serialized on one partition.
///
/// Sections are enqueued in strictly increasing `start_seqno` and never
/// overlap. While a section is live, no other partition may deliver an event
/// positioned at or after its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalSection {
    /// Partition that owns the serialized range.
    pub partition: u32,
    /// First seqno of the range, inclusive.
    pub start_seqno: u64,
    /// Last seqno of the range, inclusive.
    pub end_seqno: u64,
}

impl CriticalSection {
    /// Starts a new section covering a single seqno.
    pub fn starting_at(partition: u32, seqno: u64) -> Self {
        Self {
            partition,
            start_seqno: seqno,
            end_seqno: seqno,
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    /// Live sections in increasing `start_seqno` order; the front gates
    /// delivery.
    sections: VecDeque<CriticalSection>,
    /// Highest seqno each partition has confirmed delivering through.
    ///
    /// Zero means nothing confirmed yet; upstream seqnos start at one.
    drained: Vec<u64>,
}

impl TrackerState {
    /// Pops every leading section whose retirement condition holds.
    ///
    /// A section retires when its owner has delivered its end event and every
    /// other partition has confirmed draining everything below its start.
    fn retire_eligible(&mut self) -> bool {
        let mut retired = false;

        while let Some(front) = self.sections.front() {
            let owner = front.partition;
            let start_seqno = front.start_seqno;
            let end_seqno = front.end_seqno;

            let owner_done = self.drained[owner as usize] >= end_seqno;
            let others_drained = self
                .drained
                .iter()
                .enumerate()
                .filter(|(partition, _)| *partition as u32 != owner)
                .all(|(_, drained)| *drained >= start_seqno.saturating_sub(1));

            if owner_done && others_drained {
                self.sections.pop_front();
                retired = true;
            } else {
                break;
            }
        }

        retired
    }
}

/// Shared tracker coordinating critical-section retirement across readers.
///
/// The dispatch queue enqueues closed sections; partition readers report
/// every delivery and park at [`CriticalSectionTracker::clearance`] until the
/// gating section retires. Retirement wakes all parked readers at once.
#[derive(Debug)]
pub struct CriticalSectionTracker {
    state: Mutex<TrackerState>,
    retired: Notify,
    capacity: usize,
}

impl CriticalSectionTracker {
    /// Creates a tracker for the given partition count with a bounded section
    /// queue.
    pub fn new(partitions: u32, capacity: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                sections: VecDeque::new(),
                drained: vec![0; partitions as usize],
            }),
            retired: Notify::new(),
            capacity,
        }
    }

    /// Enqueues a closed critical section.
    ///
    /// A full queue is fatal: it means readers are not draining and the
    /// buffers are mis-sized.
    pub fn enqueue(&self, section: CriticalSection) -> RelayResult<()> {
        let mut state = self.state.lock().unwrap();

        if state.sections.len() >= self.capacity {
            bail!(
                ErrorKind::InvariantViolation,
                "Critical section queue cannot accept more sections",
                format!("capacity={}", self.capacity)
            );
        }

        state.sections.push_back(section);

        Ok(())
    }

    /// Blocks until the given partition may deliver the data event at `seqno`.
    ///
    /// The owner of the front section passes immediately, as does any event
    /// positioned before the section starts. A gated reader first confirms it
    /// has drained everything below the section start, which is what allows
    /// the section to retire.
    pub async fn clearance(&self, partition: u32, seqno: u64) {
        loop {
            let notified = self.retired.notified();
            tokio::pin!(notified);
            // Register for notify_waiters before checking the condition so a
            // retirement between the check and the await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().unwrap();

                let gated = match state.sections.front() {
                    None => false,
                    Some(front) => front.partition != partition && seqno >= front.start_seqno,
                };

                if !gated {
                    return;
                }

                // Parking here confirms every event below the section start
                // routed to this partition has been delivered.
                let drained = &mut state.drained[partition as usize];
                *drained = (*drained).max(seqno.saturating_sub(1));

                if state.retire_eligible() {
                    self.retired.notify_waiters();
                    continue;
                }
            }

            notified.await;
        }
    }

    /// Records delivery of a data event and retires eligible sections.
    pub fn on_data_delivered(&self, partition: u32, seqno: u64) {
        self.confirm(partition, seqno);
    }

    /// Records delivery of a control event and retires eligible sections.
    ///
    /// Delivering a control at seqno S implies every data event at or below S
    /// routed to this partition was already delivered.
    pub fn on_control_delivered(&self, partition: u32, seqno: u64) {
        self.confirm(partition, seqno);
    }

    /// Returns the partition currently holding the serialization gate, if any.
    pub fn serializing_partition(&self) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.sections.front().map(|section| section.partition)
    }

    /// Returns the number of live sections.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().sections.len()
    }

    /// Returns `true` when no sections are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn confirm(&self, partition: u32, seqno: u64) {
        let mut state = self.state.lock().unwrap();

        let drained = &mut state.drained[partition as usize];
        *drained = (*drained).max(seqno);

        if state.retire_eligible() {
            self.retired.notify_waiters();
        }
    }
}

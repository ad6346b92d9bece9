use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use relay_config::shared::SkipRange;

use crate::types::{ControlKind, Header, StageEvent, WatchPredicate};

/// What the stage loop should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Apply the event.
    Proceed,
    /// Skip the event, update position without forcing a commit.
    ContinueNext,
    /// Skip the event, update position and commit at the block boundary.
    ContinueNextCommit,
    /// Update position and terminate the loop.
    Quit,
}

/// Advises the stage loop, records restart points, and latches cancellation.
///
/// The schedule is shared between the task and its controller: the controller
/// cancels and registers stop watches, the task asks for dispositions and
/// records its last processed header.
#[derive(Debug, Default)]
pub struct Schedule {
    cancelled: AtomicBool,
    skip_ranges: Vec<SkipRange>,
    stop_watches: Mutex<Vec<WatchPredicate>>,
    last_processed: Mutex<Option<Header>>,
    processed_count: AtomicU64,
}

impl Schedule {
    /// Creates a schedule with the given skip ranges.
    pub fn new(skip_ranges: Vec<SkipRange>) -> Self {
        Self {
            skip_ranges,
            ..Default::default()
        }
    }

    /// Decides what the loop should do with the next event.
    ///
    /// Control events are position updates: syncs commit at the next block
    /// boundary, stops terminate the loop. Data events are checked against
    /// the configured skip ranges and any registered stop watches; stop
    /// watches fire only at transaction boundaries.
    pub fn advise(&self, event: &StageEvent) -> Disposition {
        match event {
            StageEvent::Control(control) => match control.kind {
                ControlKind::Stop => Disposition::Quit,
                ControlKind::Sync | ControlKind::Enroll => Disposition::ContinueNextCommit,
            },
            StageEvent::Data(data) => {
                for range in &self.skip_ranges {
                    if range.contains(data.seqno) {
                        return if range.commit_at_skip {
                            Disposition::ContinueNextCommit
                        } else {
                            Disposition::ContinueNext
                        };
                    }
                }

                if data.last_frag {
                    let header = data.header();
                    let mut watches = self.stop_watches.lock().unwrap();
                    if watches.iter().any(|watch| watch.matches(&header)) {
                        watches.retain(|watch| !watch.matches(&header));
                        return Disposition::Quit;
                    }
                }

                Disposition::Proceed
            }
        }
    }

    /// Registers a stop watch: the task quits after processing the first
    /// transaction boundary matching the predicate.
    pub fn add_stop_watch(&self, predicate: WatchPredicate) {
        self.stop_watches.lock().unwrap().push(predicate);
    }

    /// Latches cancellation; once set it never resets.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Records the most recently processed header for this task.
    pub fn set_last_processed(&self, header: Header) {
        *self.last_processed.lock().unwrap() = Some(header);
        self.processed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the most recently processed header.
    pub fn last_processed(&self) -> Option<Header> {
        self.last_processed.lock().unwrap().clone()
    }

    /// Returns the cumulative number of processed events.
    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }
}

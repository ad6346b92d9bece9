use std::time::{Duration, Instant};

/// Interval timers and counters for one stage task.
///
/// The loop brackets each phase with `begin_interval` / `end_*_interval`;
/// totals are split into extract, filter, and apply time so slow phases are
/// attributable.
#[derive(Debug, Default)]
pub struct TaskProgress {
    interval_start: Option<Instant>,
    extract_total: Duration,
    filter_total: Duration,
    apply_total: Duration,
    event_count: u64,
}

/// Point-in-time copy of a task's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskProgressSnapshot {
    pub extract_total: Duration,
    pub filter_total: Duration,
    pub apply_total: Duration,
    pub event_count: u64,
}

impl TaskProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing a phase.
    pub fn begin_interval(&mut self) {
        self.interval_start = Some(Instant::now());
    }

    /// Ends the current interval, attributing it to extraction.
    pub fn end_extract_interval(&mut self) {
        let elapsed = self.take_interval();
        self.extract_total += elapsed;
    }

    /// Ends the current interval, attributing it to filtering.
    pub fn end_filter_interval(&mut self) {
        let elapsed = self.take_interval();
        self.filter_total += elapsed;
    }

    /// Ends the current interval, attributing it to application.
    pub fn end_apply_interval(&mut self) {
        let elapsed = self.take_interval();
        self.apply_total += elapsed;
    }

    /// Counts one successfully applied event.
    pub fn increment_events(&mut self) {
        self.event_count += 1;
    }

    /// Returns the number of successfully applied events.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Returns a copy of all totals.
    pub fn snapshot(&self) -> TaskProgressSnapshot {
        TaskProgressSnapshot {
            extract_total: self.extract_total,
            filter_total: self.filter_total,
            apply_total: self.apply_total,
            event_count: self.event_count,
        }
    }

    fn take_interval(&mut self) -> Duration {
        self.interval_start
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }
}

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use relay_config::shared::{FailurePolicy, StageConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::applier::{Applier, FilteredRange};
use crate::concurrency::shutdown::{ShutdownRx, wait_for_shutdown};
use crate::error::{ErrorKind, RelayResult};
use crate::extractor::Extractor;
use crate::filter::Filter;
use crate::metrics::{
    RELAY_APPLY_DURATION_SECONDS, RELAY_COMMITS_TOTAL, RELAY_EVENTS_APPLIED_TOTAL, TASK_LABEL,
};
use crate::relay_error;
use crate::stage::progress::TaskProgress;
use crate::stage::schedule::{Disposition, Schedule};
use crate::types::{Header, StageEvent};

/// Out-of-band notifications dispatched by a stage task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageNotification {
    /// The task is processing its assigned sequence.
    InSequence { task: String },
    /// The task hit a failure its policy does not absorb.
    ///
    /// Application failures carry the position of the failing event so a
    /// restart can be exact.
    Error {
        task: String,
        message: String,
        seqno: Option<u64>,
        event_id: Option<String>,
    },
}

/// Why the main loop returned.
enum LoopExit {
    /// Normal termination: quit disposition, stop event, or policy stop.
    Completed,
    /// Cooperative cancellation interrupted a suspension.
    Cancelled,
}

/// Handle for monitoring a spawned stage task.
#[derive(Debug)]
pub struct StageTaskHandle {
    handle: Option<JoinHandle<RelayResult<()>>>,
}

impl StageTaskHandle {
    /// Waits for the stage task to complete.
    pub async fn wait(mut self) -> RelayResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            if err.is_cancelled() {
                relay_error!(ErrorKind::Cancelled, "Stage task was cancelled")
            } else {
                relay_error!(
                    ErrorKind::InvariantViolation,
                    "Stage task panicked",
                    err.to_string()
                )
            }
        })??;

        Ok(())
    }
}

/// Single-threaded loop binding an extractor, a filter chain, and an applier.
///
/// The loop batches transactions into block commits, applies the configured
/// failure policies, tracks restart points through the applier, and honors
/// cooperative cancellation: a latched flag checked at the loop head plus a
/// shutdown signal raced against the extract suspension.
pub struct StageTask<E, A> {
    name: String,
    config: Arc<StageConfig>,
    extractor: E,
    filters: Vec<Box<dyn Filter>>,
    applier: A,
    schedule: Arc<Schedule>,
    notifications: mpsc::UnboundedSender<StageNotification>,
    shutdown_rx: ShutdownRx,
    using_block_commit: bool,
    block_event_count: u64,
    current_service: Option<String>,
    progress: TaskProgress,
}

impl<E, A> StageTask<E, A>
where
    E: Extractor + Send + 'static,
    A: Applier + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        config: Arc<StageConfig>,
        extractor: E,
        filters: Vec<Box<dyn Filter>>,
        applier: A,
        schedule: Arc<Schedule>,
        notifications: mpsc::UnboundedSender<StageNotification>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        let using_block_commit = config.using_block_commit();
        Self {
            name: name.into(),
            config,
            extractor,
            filters,
            applier,
            schedule,
            notifications,
            shutdown_rx,
            using_block_commit,
            block_event_count: 0,
            current_service: None,
            progress: TaskProgress::new(),
        }
    }

    /// Spawns the task loop and returns a handle for monitoring it.
    pub fn spawn(self) -> StageTaskHandle {
        let span = tracing::info_span!("stage_task", task = %self.name);
        let handle = tokio::spawn(self.run().instrument(span));

        StageTaskHandle {
            handle: Some(handle),
        }
    }

    /// Runs the task loop to completion.
    pub async fn run(mut self) -> RelayResult<()> {
        info!(task = %self.name, "starting stage task");

        if self.config.auto_sync {
            let _ = self.notifications.send(StageNotification::InSequence {
                task: self.name.clone(),
            });
        }

        let result = self.run_loop().await;

        match result {
            Ok(LoopExit::Completed) => {
                // Flush whatever partial block is still open.
                if let Err(err) = self.applier.commit().await {
                    error!(error = %err, "final commit failed");
                    self.notify_error(format!("Final commit failed: {err}"), None, None);
                    return Err(err);
                }
            }
            Ok(LoopExit::Cancelled) => {
                // Release locks and clear partial work.
                if let Err(err) = self.applier.rollback().await {
                    warn!(error = %err, "rollback failed during cancellation");
                }
            }
            Err(err) => {
                error!(error = %err, "stage task failed");
                self.notify_error(format!("Stage task failed: {err}"), None, None);
                return Err(err);
            }
        }

        if let Some(header) = self.schedule.last_processed() {
            info!(
                seqno = header.seqno,
                event_id = %header.event_id,
                "last successfully processed event prior to termination"
            );
        }
        info!(
            event_count = self.progress.event_count(),
            "stage task terminated"
        );

        Ok(())
    }

    async fn run_loop(&mut self) -> RelayResult<LoopExit> {
        let sync_thl_with_extractor = self.config.sync_thl_with_extractor;

        // Header of the previous event, recorded as last-processed at the
        // next loop head unless the event was suppressed.
        let mut current_event: Option<Header> = None;
        // Bounds of the currently accumulating suppressed range.
        let mut filtered_range: Option<(Header, Header)> = None;

        loop {
            if filtered_range.is_none()
                && let Some(header) = current_event.take()
            {
                self.schedule.set_last_processed(header);
            }

            if self.schedule.is_cancelled() {
                info!("stage task has been cancelled");
                break;
            }

            // Fetch the next event, racing the shutdown signal against the
            // extract suspension.
            self.progress.begin_interval();
            let extracted = {
                let extractor = &mut self.extractor;
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut self.shutdown_rx) => None,
                    result = extractor.extract() => Some(result),
                }
            };
            self.progress.end_extract_interval();

            let Some(extracted) = extracted else {
                info!("shutdown requested, cancelling stage task");
                self.schedule.cancel();
                return Ok(LoopExit::Cancelled);
            };

            let generic = match extracted {
                Ok(generic) => generic,
                Err(err) => {
                    let message = format!("Event extraction failed: {err}");
                    match self.config.extractor_failure_policy {
                        FailurePolicy::Stop => {
                            self.notify_error(message, None, None);
                            break;
                        }
                        FailurePolicy::Warn => {
                            error!(error = %err, "event extraction failed");
                            continue;
                        }
                    }
                }
            };

            let Some(generic) = generic else {
                debug!("no event extracted, retrying");
                current_event = None;
                continue;
            };

            // A service change must not merge transactions from different
            // services into one commit block.
            if self.using_block_commit
                && let StageEvent::Data(data) = &generic
            {
                match self.current_service.as_deref() {
                    None => self.current_service = Some(data.service.clone()),
                    Some(previous) if previous != data.service.as_str() => {
                        let previous = previous.to_string();
                        if data.fragno == 0 {
                            debug!(
                                previous,
                                service = %data.service,
                                seqno = data.seqno,
                                "committing due to service change"
                            );
                            self.applier.commit().await?;
                            self.block_event_count = 0;
                        } else {
                            warn!(
                                previous,
                                service = %data.service,
                                seqno = data.seqno,
                                fragno = data.fragno,
                                "service name change between fragments"
                            );
                        }
                        self.current_service = Some(data.service.clone());
                    }
                    Some(_) => {}
                }
            }

            match self.schedule.advise(&generic) {
                Disposition::Proceed => {}
                Disposition::ContinueNext => {
                    self.update_position(&generic, false).await?;
                    current_event = None;
                    continue;
                }
                Disposition::ContinueNextCommit => {
                    self.update_position(&generic, true).await?;
                    current_event = None;
                    continue;
                }
                Disposition::Quit => {
                    debug!("quitting task processing loop");
                    self.update_position(&generic, false).await?;
                    break;
                }
            }

            let event = match generic {
                StageEvent::Data(event) => event,
                // The schedule never proceeds on control events.
                StageEvent::Control(_) => continue,
            };
            debug!(seqno = event.seqno, fragno = event.fragno, "extracted event");
            current_event = Some(event.header());

            // Run filters in order; the first None suppresses the event.
            self.progress.begin_interval();
            let mut filtered = Some(event);
            let mut filter_error = None;
            for filter in &mut self.filters {
                let Some(event) = filtered.take() else {
                    break;
                };
                match filter.filter(event) {
                    Ok(Some(event)) => filtered = Some(event),
                    Ok(None) => {
                        debug!(filter = filter.name(), "event discarded by filter");
                        break;
                    }
                    Err(err) => {
                        filter_error = Some((filter.name().to_string(), err));
                        break;
                    }
                }
            }
            self.progress.end_filter_interval();

            // A misbehaving filter escalates as an application-class failure.
            if let Some((filter_name, err)) = filter_error {
                let header = current_event.clone();
                let message = format!("Filter `{filter_name}` failed: {err}");
                match self.config.applier_failure_policy {
                    FailurePolicy::Stop => {
                        self.notify_error(
                            message,
                            header.as_ref().map(|h| h.seqno),
                            header.map(|h| h.event_id),
                        );
                        break;
                    }
                    FailurePolicy::Warn => {
                        error!(filter = %filter_name, error = %err, "filter failed");
                        current_event = None;
                        continue;
                    }
                }
            }

            let Some(event) = filtered else {
                // Suppressed: extend the filtered range and fetch the next
                // event.
                if let Some(header) = current_event.clone() {
                    match &mut filtered_range {
                        None => filtered_range = Some((header.clone(), header)),
                        Some((_, last)) => *last = header,
                    }
                }
                continue;
            };

            // Deliver the pending suppressed range before this event so the
            // restart position advances monotonically.
            if let Some((first, last)) = filtered_range.clone() {
                debug!(
                    first_seqno = first.seqno,
                    last_seqno = last.seqno,
                    "applying filtered range"
                );
                self.progress.begin_interval();
                let result = self
                    .applier
                    .apply_filtered_range(FilteredRange { first, last })
                    .await;
                self.progress.end_apply_interval();

                match result {
                    Ok(()) => filtered_range = None,
                    Err(err) => {
                        let message = format!("Filtered range application failed: {err}");
                        error!(error = %err, "filtered range application failed");
                        match self.config.applier_failure_policy {
                            FailurePolicy::Stop => {
                                self.notify_error(
                                    message,
                                    Some(event.seqno),
                                    Some(event.event_id.clone()),
                                );
                                break;
                            }
                            FailurePolicy::Warn => continue,
                        }
                    }
                }
            }

            let unsafe_for_block_commit = event.is_unsafe_for_block_commit();
            let mut do_rollback = false;

            // Implicit commit points ahead of the current event.
            if event.fragno == 0 && !event.last_frag {
                // A fragmented transaction is starting.
                self.applier.commit().await?;
                self.block_event_count = 0;
            } else if event.fragno == 0 && event.is_rollback() {
                // The transaction rolls back at its end; commit previous work
                // so only the current transaction is rolled back.
                self.applier.commit().await?;
                self.block_event_count = 0;
                do_rollback = true;
            } else if unsafe_for_block_commit {
                self.applier.commit().await?;
                self.block_event_count = 0;
            }

            let do_commit = if unsafe_for_block_commit {
                true
            } else if self.using_block_commit {
                self.block_event_count += 1;
                if event.last_frag
                    && (self.block_event_count >= self.config.block_commit_rows
                        || !self.extractor.has_more())
                {
                    self.block_event_count = 0;
                    true
                } else {
                    false
                }
            } else {
                event.last_frag
            };

            debug!(
                seqno = event.seqno,
                fragno = event.fragno,
                do_commit,
                "applying event"
            );
            self.progress.begin_interval();
            let apply_started = Instant::now();
            let result = self
                .applier
                .apply(&event, do_commit, do_rollback, sync_thl_with_extractor)
                .await;
            self.progress.end_apply_interval();

            match result {
                Ok(()) => {
                    self.progress.increment_events();
                    counter!(
                        RELAY_EVENTS_APPLIED_TOTAL,
                        TASK_LABEL => self.name.clone(),
                    )
                    .increment(1);
                    if do_commit {
                        counter!(RELAY_COMMITS_TOTAL, TASK_LABEL => self.name.clone())
                            .increment(1);
                    }
                    histogram!(
                        RELAY_APPLY_DURATION_SECONDS,
                        TASK_LABEL => self.name.clone(),
                    )
                    .record(apply_started.elapsed().as_secs_f64());
                }
                Err(err) => {
                    let message = format!(
                        "Event application failed: seqno={} fragno={}: {err}",
                        event.seqno, event.fragno
                    );
                    error!(
                        seqno = event.seqno,
                        fragno = event.fragno,
                        error = %err,
                        "event application failed"
                    );
                    match self.config.applier_failure_policy {
                        FailurePolicy::Stop => {
                            self.notify_error(
                                message,
                                Some(event.seqno),
                                Some(event.event_id.clone()),
                            );
                            break;
                        }
                        FailurePolicy::Warn => {
                            // The failed event must not become a restart
                            // point.
                            current_event = None;
                            continue;
                        }
                    }
                }
            }
        }

        Ok(LoopExit::Completed)
    }

    /// Updates the persisted position for an event that is not applied.
    ///
    /// Recapitulates the block-commit decision so control events force a
    /// commit only at block boundaries.
    async fn update_position(&mut self, event: &StageEvent, commit: bool) -> RelayResult<()> {
        let Some(header) = event.header() else {
            debug!("unable to update position, event carries no header");
            return Ok(());
        };

        let mut do_commit = commit;
        if self.using_block_commit {
            self.block_event_count += 1;
            if self.block_event_count >= self.config.block_commit_rows
                || !self.extractor.has_more()
            {
                do_commit = true;
                self.block_event_count = 0;
            }
        } else {
            do_commit = true;
        }

        debug!(seqno = header.seqno, do_commit, "updating position");
        self.progress.begin_interval();
        let result = self.applier.update_position(header, do_commit, false).await;
        self.progress.end_apply_interval();

        result
    }

    fn notify_error(&self, message: String, seqno: Option<u64>, event_id: Option<String>) {
        let _ = self.notifications.send(StageNotification::Error {
            task: self.name.clone(),
            message,
            seqno,
            event_id,
        });
    }
}

use std::sync::Arc;

use relay_config::shared::ReplicatorConfig;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::applier::Applier;
use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::dispatch::{ParallelDispatchQueue, PartitionReader, PartitionerRegistry};
use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::filter::Filter;
use crate::metrics::register_metrics;
use crate::relay_error;
use crate::stage::{Schedule, StageNotification, StageTask, StageTaskHandle};

/// Orchestrates a complete parallel replication fan-out.
///
/// The pipeline builds the dispatch queue and its partition readers from
/// configuration, then binds one stage task to each reader. The upstream
/// feed drives [`Pipeline::producer`]; stop requests travel through the
/// stream as control events so every task terminates at a transaction
/// boundary.
pub struct Pipeline {
    config: Arc<ReplicatorConfig>,
    queue: ParallelDispatchQueue,
    readers: Option<Vec<PartitionReader>>,
    schedules: Vec<Arc<Schedule>>,
    handles: Vec<StageTaskHandle>,
    shutdown_tx: ShutdownTx,
    notifications_tx: mpsc::UnboundedSender<StageNotification>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline using the built-in partitioner registry.
    ///
    /// Returns the pipeline and the receiver for stage notifications.
    pub fn new(
        config: ReplicatorConfig,
    ) -> RelayResult<(Self, mpsc::UnboundedReceiver<StageNotification>)> {
        Self::with_registry(config, &PartitionerRegistry::with_builtins())
    }

    /// Creates a pipeline resolving the partitioner through a caller-supplied
    /// registry.
    pub fn with_registry(
        config: ReplicatorConfig,
        registry: &PartitionerRegistry,
    ) -> RelayResult<(Self, mpsc::UnboundedReceiver<StageNotification>)> {
        config.validate().map_err(|err| {
            relay_error!(
                ErrorKind::ConfigError,
                "Replicator configuration failed validation",
                err.to_string()
            )
        })?;

        register_metrics();

        let partitioner = registry.build(&config.dispatch.partitioner, config.dispatch.partitions)?;
        let (queue, readers) = ParallelDispatchQueue::new(config.dispatch.clone(), partitioner);
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();

        let pipeline = Self {
            config: Arc::new(config),
            queue,
            readers: Some(readers),
            schedules: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
            notifications_tx,
        };

        Ok((pipeline, notifications_rx))
    }

    /// Starts one stage task per partition.
    ///
    /// `bind` is called once per partition and returns the applier plus the
    /// filter chain for that partition's stage task.
    pub fn start<A, B>(&mut self, mut bind: B) -> RelayResult<()>
    where
        A: Applier + Send + 'static,
        B: FnMut(u32) -> (A, Vec<Box<dyn Filter>>),
    {
        let Some(readers) = self.readers.take() else {
            bail!(
                ErrorKind::InvariantViolation,
                "Pipeline has already been started"
            );
        };

        info!(
            service = %self.config.service_name,
            partitions = self.config.dispatch.partitions,
            "starting pipeline"
        );

        let stage_config = Arc::new(self.config.stage.clone());
        for reader in readers {
            let partition = reader.partition();
            let (applier, filters) = bind(partition);
            let schedule = Arc::new(Schedule::new(self.config.stage.skip_ranges.clone()));

            let task = StageTask::new(
                format!("{}-q2dbms-{partition}", self.config.service_name),
                stage_config.clone(),
                reader,
                filters,
                applier,
                schedule.clone(),
                self.notifications_tx.clone(),
                self.shutdown_tx.subscribe(),
            );

            self.schedules.push(schedule);
            self.handles.push(task.spawn());
        }

        Ok(())
    }

    /// Returns the producer side fed by the upstream extractor.
    pub fn producer(&mut self) -> &mut ParallelDispatchQueue {
        &mut self.queue
    }

    /// Returns the per-partition schedules for cancellation and stop watches.
    pub fn schedules(&self) -> &[Arc<Schedule>] {
        &self.schedules
    }

    /// Requests a graceful stop: a stop control event travels through the
    /// stream and every task quits at a transaction boundary.
    pub async fn request_stop(&mut self) -> RelayResult<()> {
        info!("requesting pipeline stop at next transaction boundary");
        self.queue.insert_stop_event().await
    }

    /// Signals cooperative shutdown to every stage task.
    ///
    /// Unlike [`Pipeline::request_stop`], this interrupts blocking waits:
    /// tasks roll back open work instead of committing it.
    pub fn shutdown(&self) {
        info!("sending shutdown signal to pipeline workers");
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for every stage task to complete.
    ///
    /// Failures are logged per task; the first one is returned after all
    /// tasks have been joined.
    pub async fn wait(mut self) -> RelayResult<()> {
        let mut first_failure: Option<RelayError> = None;

        for handle in self.handles.drain(..) {
            if let Err(err) = handle.wait().await {
                error!(error = %err, "stage task failed");
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Signals shutdown and waits for all tasks to complete.
    pub async fn shutdown_and_wait(self) -> RelayResult<()> {
        self.shutdown();
        self.wait().await
    }
}

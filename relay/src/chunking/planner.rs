use std::sync::Arc;

use bigdecimal::{BigDecimal, ToPrimitive};
use metrics::counter;
use relay_config::shared::ChunkingConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::bail;
use crate::chunking::chunk::{NumericChunk, TableRef};
use crate::chunking::definitions::ChunkDefinitions;
use crate::error::{ErrorKind, RelayResult};
use crate::metrics::{RELAY_CHUNKS_PLANNED_TOTAL, TABLE_LABEL};
use crate::relay_error;
use crate::store::{KeyValue, StoreInspector, TableInfo};

/// Handle for monitoring a spawned chunk planner.
#[derive(Debug)]
pub struct ChunkPlannerHandle {
    handle: Option<JoinHandle<RelayResult<()>>>,
}

impl ChunkPlannerHandle {
    /// Waits for the planner to finish emitting chunks.
    pub async fn wait(mut self) -> RelayResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            if err.is_cancelled() {
                relay_error!(ErrorKind::Cancelled, "Chunk planner was cancelled")
            } else {
                relay_error!(
                    ErrorKind::InvariantViolation,
                    "Chunk planner panicked",
                    err.to_string()
                )
            }
        })??;

        Ok(())
    }
}

/// Plans bounded key-range chunks for parallel snapshot extraction.
///
/// The planner walks either an explicit chunk-definitions document or every
/// non-system schema, splits each table by its numeric primary key into
/// chunks of roughly `chunk_size` rows, and feeds them to a bounded work
/// queue shared by the extract workers. Tables without a usable key are
/// emitted as single whole-table chunks. When planning completes, one
/// end-of-stream chunk per extract channel lets every worker exit cleanly.
pub struct ChunkPlanner<I> {
    inspector: I,
    config: Arc<ChunkingConfig>,
    definitions: Option<ChunkDefinitions>,
    chunk_tx: mpsc::Sender<NumericChunk>,
}

impl<I> ChunkPlanner<I>
where
    I: StoreInspector + 'static,
{
    pub fn new(
        inspector: I,
        config: Arc<ChunkingConfig>,
        definitions: Option<ChunkDefinitions>,
        chunk_tx: mpsc::Sender<NumericChunk>,
    ) -> Self {
        Self {
            inspector,
            config,
            definitions,
            chunk_tx,
        }
    }

    /// Spawns the planner on its own task.
    pub fn spawn(self) -> ChunkPlannerHandle {
        let span = tracing::info_span!("chunk_planner");
        let handle = tokio::spawn(self.run().instrument(span));

        ChunkPlannerHandle {
            handle: Some(handle),
        }
    }

    /// Runs the planner to completion.
    pub async fn run(self) -> RelayResult<()> {
        if let Some(definitions) = &self.definitions {
            info!("planning chunks from definitions document");
            for request in definitions.requests() {
                match &request.table {
                    Some(table) => {
                        let Some(info) =
                            self.inspector.find_table(&request.schema, table).await?
                        else {
                            warn!(
                                schema = %request.schema,
                                table = %table,
                                "table not found, skipping request"
                            );
                            continue;
                        };
                        self.plan_table(&info, request.chunk_size, request.columns.clone())
                            .await?;
                    }
                    None => self.plan_schema(&request.schema).await?,
                }
            }
        } else {
            for schema in self.inspector.schemas().await? {
                if self.inspector.is_system_schema(&schema) {
                    debug!(schema = %schema, "skipping system schema");
                    continue;
                }
                self.plan_schema(&schema).await?;
            }
        }

        // One end-of-stream chunk per worker so each exits cleanly.
        for channel in 0..self.config.extract_channels {
            debug!(channel, "posting job complete request");
            self.send(NumericChunk::end_of_stream()).await?;
        }

        Ok(())
    }

    async fn plan_schema(&self, schema: &str) -> RelayResult<()> {
        debug!(schema = %schema, "listing tables");
        for table in self.inspector.tables(schema).await? {
            self.plan_table(&table, -1, None).await?;
        }

        Ok(())
    }

    async fn plan_table(
        &self,
        table: &TableInfo,
        chunk_size_override: i64,
        columns: Option<Vec<String>>,
    ) -> RelayResult<()> {
        let chunk_size = match chunk_size_override {
            size if size < 0 => self.config.chunk_size,
            0 => {
                // Explicitly requested as a single chunk.
                return self
                    .emit(NumericChunk::whole_table(table_ref(table), columns))
                    .await;
            }
            size => size as u64,
        };

        info!(table = %table, chunk_size, "processing table");

        let Some(primary_key) = table
            .primary_key
            .as_ref()
            .filter(|primary_key| primary_key.is_chunkable())
        else {
            warn!(table = %table, "no single-column numeric key, emitting whole table");
            return self
                .emit(NumericChunk::whole_table(table_ref(table), columns))
                .await;
        };

        let column = &primary_key.columns[0];
        let Some(statistics) = self.inspector.key_statistics(table, column).await? else {
            // An empty table still yields one whole-table chunk so downstream
            // workers observe it.
            debug!(table = %table, "table is empty, emitting whole table");
            return self
                .emit(NumericChunk::whole_table(table_ref(table), columns))
                .await;
        };

        info!(
            table = %table,
            min = %statistics.min,
            max = %statistics.max,
            count = statistics.count,
            "retrieved key range"
        );

        if statistics.count <= chunk_size {
            return self
                .emit(NumericChunk::whole_table(table_ref(table), columns))
                .await;
        }

        match (&statistics.min, &statistics.max) {
            (KeyValue::Integer(min), KeyValue::Integer(max)) => {
                self.plan_integer_chunks(table, *min, *max, statistics.count, chunk_size, columns)
                    .await
            }
            (KeyValue::Decimal(min), KeyValue::Decimal(max)) => {
                self.plan_decimal_chunks(table, min, max, statistics.count, chunk_size, columns)
                    .await
            }
            _ => {
                bail!(
                    ErrorKind::InvariantViolation,
                    "Key probe returned mismatched min/max types",
                    format!("table={table}")
                );
            }
        }
    }

    /// Splits an integer key range into `(start, end]` chunks.
    async fn plan_integer_chunks(
        &self,
        table: &TableInfo,
        min: i64,
        max: i64,
        count: u64,
        chunk_size: u64,
        columns: Option<Vec<String>>,
    ) -> RelayResult<()> {
        let min = i128::from(min);
        let max = i128::from(max);
        let gap = max - min;
        if gap <= 0 {
            return self
                .emit(NumericChunk::whole_table(table_ref(table), columns))
                .await;
        }

        let block = div_ceil_i128(i128::from(chunk_size) * gap, i128::from(count));
        let total_blocks = div_ceil_i128(gap, block) as u64;

        let mut start = min - 1;
        while start < max {
            let end = (start + block).min(max);
            self.emit(NumericChunk::ranged(
                table_ref(table),
                KeyValue::Integer(clamp_to_i64(start)),
                KeyValue::Integer(clamp_to_i64(end)),
                columns.clone(),
                total_blocks,
            ))
            .await?;
            start = end;
        }

        Ok(())
    }

    /// Splits a fixed-scale decimal key range into `(start, end]` chunks with
    /// endpoints rounded up to integers.
    async fn plan_decimal_chunks(
        &self,
        table: &TableInfo,
        min: &BigDecimal,
        max: &BigDecimal,
        count: u64,
        chunk_size: u64,
        columns: Option<Vec<String>>,
    ) -> RelayResult<()> {
        use bigdecimal::RoundingMode;

        let gap = (max - min).with_scale_round(0, RoundingMode::Ceiling);
        let block = (&gap * BigDecimal::from(chunk_size) / BigDecimal::from(count))
            .with_scale_round(0, RoundingMode::Ceiling);
        let total_blocks = (&gap / &block)
            .with_scale_round(0, RoundingMode::Ceiling)
            .to_u64()
            .unwrap_or(u64::MAX);

        let max_ceiled = max.with_scale_round(0, RoundingMode::Ceiling);
        // Starting one below the floored minimum keeps the minimum key inside
        // the first `(start, end]` chunk.
        let mut start = min.with_scale_round(0, RoundingMode::Floor) - BigDecimal::from(1);
        while start < max_ceiled {
            let mut end = &start + &block;
            if end > *max {
                end = max.clone();
            }
            let end = end.with_scale_round(0, RoundingMode::Ceiling);

            self.emit(NumericChunk::ranged(
                table_ref(table),
                KeyValue::Decimal(start.clone()),
                KeyValue::Decimal(end.clone()),
                columns.clone(),
                total_blocks,
            ))
            .await?;
            start = end;
        }

        Ok(())
    }

    async fn emit(&self, chunk: NumericChunk) -> RelayResult<()> {
        if let Some(table) = &chunk.table {
            counter!(
                RELAY_CHUNKS_PLANNED_TOTAL,
                TABLE_LABEL => table.to_string(),
            )
            .increment(1);
        }

        self.send(chunk).await
    }

    async fn send(&self, chunk: NumericChunk) -> RelayResult<()> {
        if self.chunk_tx.send(chunk).await.is_err() {
            bail!(
                ErrorKind::Cancelled,
                "Chunk queue consumers are gone, stopping planner"
            );
        }

        Ok(())
    }
}

fn table_ref(table: &TableInfo) -> TableRef {
    TableRef {
        schema: table.schema.clone(),
        name: table.name.clone(),
    }
}

/// Ceiling division for positive operands.
fn div_ceil_i128(dividend: i128, divisor: i128) -> i128 {
    (dividend + divisor - 1) / divisor
}

fn clamp_to_i64(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

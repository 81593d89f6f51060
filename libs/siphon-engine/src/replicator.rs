//! Replication control loop of one unit.
//!
//! One source stream into one destination table, driven by exactly one
//! worker task: schema reconciliation, truncate-at-watermark resume, live
//! tailing with count/time flush triggers, cooperative stop. Any
//! unrecoverable error terminates the loop and propagates to the owning
//! supervisor — there is no internal retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use siphon_api::column::{ColumnModel, ColumnType, flatten_leaves};
use siphon_api::destination::{DestinationClient, TableRef};
use siphon_api::source::{AvailabilityCallback, SourceClient, SourceCursor};

use crate::error::EngineError;
use crate::translator::{self, TranslatedSchema};
use crate::writer::BatchedWriter;

/// Loop stage, carried in logs and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initializing,
    ReconcilingSchema,
    Resuming,
    Tailing,
    Flushing,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplicationSettings {
    pub flush_count: usize,
    pub flush_interval: Duration,
    pub decimal_scale: u8,
}

pub struct Replicator {
    key: String,
    stream: String,
    table: TableRef,
    live: bool,
    settings: ReplicationSettings,
    source: Arc<dyn SourceClient>,
    destination: Arc<dyn DestinationClient>,
    token: CancellationToken,
    stage: Stage,
}

impl Replicator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: impl Into<String>,
        stream: impl Into<String>,
        table: TableRef,
        live: bool,
        settings: ReplicationSettings,
        source: Arc<dyn SourceClient>,
        destination: Arc<dyn DestinationClient>,
        token: CancellationToken,
    ) -> Self {
        Self {
            key: key.into(),
            stream: stream.into(),
            table,
            live,
            settings,
            source,
            destination,
            token,
            stage: Stage::Initializing,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the unit to completion: source exhaustion, stop signal, or
    /// failure. Errors carry the unit key and the stage they occurred in.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let result = self.replicate().await;
        let failed_stage = self.stage;
        self.stage = Stage::Stopped;
        result.map_err(|e| e.with_context(format!("unit '{}' ({failed_stage:?})", self.key)))
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        tracing::debug!(unit = %self.key, stage = ?stage, "stage change");
    }

    async fn replicate(&mut self) -> Result<(), EngineError> {
        self.enter(Stage::Initializing);
        let stream_schema = self.source.describe(&self.stream)?;
        let schema =
            Arc::new(translator::translate(&stream_schema, self.settings.decimal_scale)?);
        tracing::info!(
            unit = %self.key,
            table = %self.table,
            types = schema.types.len(),
            columns = flatten_leaves(&schema.columns).len(),
            "schema translated"
        );

        self.enter(Stage::ReconcilingSchema);
        self.destination.ensure_database(&self.table.database).await?;
        match self.destination.describe_table(&self.table).await? {
            // Existing structures are verified, never altered or dropped.
            Some(existing) => verify_layout(&schema.columns, &existing)?,
            None => self.destination.ensure_table(&self.table, &schema.columns).await?,
        }

        self.enter(Stage::Resuming);
        let resume_from = match self.destination.timestamp_range(&self.table).await? {
            Some((_, max)) => {
                // Rows sharing the max timestamp are an indivisible,
                // possibly incomplete unit from a previous run: drop them
                // and re-read strictly after.
                self.destination.delete_at(&self.table, max).await?;
                tracing::info!(unit = %self.key, resume_after = max, "truncated tail, resuming after watermark");
                Some(max)
            }
            None => {
                tracing::info!(unit = %self.key, "empty destination, replicating from the beginning");
                None
            }
        };

        self.enter(Stage::Tailing);
        let notify = Arc::new(Notify::new());
        let waker = Arc::clone(&notify);
        let on_available: AvailabilityCallback = Arc::new(move || waker.notify_one());
        let mut cursor =
            self.source.open_cursor(&self.stream, resume_from, self.live, on_available)?;
        let mut writer =
            BatchedWriter::new(Arc::clone(&self.destination), self.table.clone(), schema);

        let tail_result = self.tail(cursor.as_mut(), &mut writer, &notify).await;

        self.enter(Stage::Stopping);
        let close_result = writer.close().await;
        tail_result.and(close_result)?;
        tracing::info!(unit = %self.key, "stopped");
        Ok(())
    }

    async fn tail(
        &mut self,
        cursor: &mut dyn SourceCursor,
        writer: &mut BatchedWriter,
        notify: &Notify,
    ) -> Result<(), EngineError> {
        let mut last_flush = tokio::time::Instant::now();
        loop {
            if self.token.is_cancelled() {
                tracing::info!(unit = %self.key, "stop requested");
                return Ok(());
            }

            match cursor.poll_next()? {
                Some(record) => writer.send(&record)?,
                None if cursor.is_exhausted() => {
                    tracing::info!(unit = %self.key, "source exhausted");
                    return Ok(());
                }
                None => {
                    // Bounded wait: data availability, the next time-based
                    // flush coming due, or stop — whichever first.
                    let remaining = self
                        .settings
                        .flush_interval
                        .saturating_sub(last_flush.elapsed());
                    if !remaining.is_zero() {
                        tokio::select! {
                            _ = notify.notified() => {}
                            _ = tokio::time::sleep(remaining) => {}
                            _ = self.token.cancelled() => {}
                        }
                    }
                }
            }

            let due_by_count = writer.pending_rows() >= self.settings.flush_count;
            let due_by_time = last_flush.elapsed() >= self.settings.flush_interval;
            if due_by_count || due_by_time {
                if writer.pending_rows() > 0 {
                    self.enter(Stage::Flushing);
                    writer.flush().await?;
                    self.enter(Stage::Tailing);
                }
                last_flush = tokio::time::Instant::now();
            }
        }
    }
}

/// Check an existing table's leaf columns against the translated layout:
/// every expected leaf must be present with an equivalent type.
fn verify_layout(
    expected: &[ColumnModel],
    existing: &[(String, ColumnType)],
) -> Result<(), EngineError> {
    for leaf in flatten_leaves(expected) {
        let found = existing.iter().find(|(name, _)| *name == leaf.name);
        match found {
            None => {
                return Err(EngineError::Schema(format!(
                    "existing table is missing column '{}'",
                    leaf.name
                )));
            }
            Some((_, ty)) => {
                if normalized(ty) != normalized(&leaf.column_type) {
                    return Err(EngineError::Schema(format!(
                        "existing column '{}' has type {ty:?}, expected {:?}",
                        leaf.name, leaf.column_type
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Collapse model types that share a destination storage type, so read-back
/// layouts compare equal to translated ones.
fn normalized(ty: &ColumnType) -> ColumnType {
    match ty {
        ColumnType::Time => ColumnType::Int32,
        ColumnType::Nullable(inner) => ColumnType::Nullable(Box::new(normalized(inner))),
        ColumnType::Array(inner) => ColumnType::Array(Box::new(normalized(inner))),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_verification_accepts_equivalent_types() {
        let expected = vec![
            ColumnModel::new("timestamp", ColumnType::DateTime),
            ColumnModel::new("open_tod", ColumnType::Time),
        ];
        let existing = vec![
            ("timestamp".to_string(), ColumnType::DateTime),
            ("open_tod".to_string(), ColumnType::Int32),
        ];
        assert!(verify_layout(&expected, &existing).is_ok());
    }

    #[test]
    fn layout_verification_rejects_missing_and_mismatched_columns() {
        let expected = vec![ColumnModel::new("price_f64", ColumnType::Float64)];
        assert!(verify_layout(&expected, &[]).is_err());
        let existing = vec![("price_f64".to_string(), ColumnType::Int64)];
        assert!(verify_layout(&expected, &existing).is_err());
    }
}

//! Batched destination writer.
//!
//! One prepared insert statement per concrete runtime type seen so far;
//! rows accumulate per plan and are shipped together on flush. The writer
//! tracks the min/max timestamp of everything buffered — the watermark the
//! resume logic relies on.

use std::sync::Arc;

use siphon_api::column::{ColumnModel, PositionMap, fixed_columns, flatten_leaves};
use siphon_api::destination::{DestinationClient, InsertStatement, TableRef};
use siphon_api::source::RawRecord;
use siphon_api::value::{CellValue, Row};
use siphon_api::wire::WireCursor;

use crate::codec::CodecCache;
use crate::error::EngineError;
use crate::translator::{TranslatedSchema, TypeTemplate};

const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Partition-date column value derived from a record timestamp.
pub fn partition_date(timestamp: i64) -> i32 {
    timestamp.div_euclid(NANOS_PER_DAY) as i32
}

/// Per-type insert plan: statement, positions, defaults, pending batch.
pub(crate) struct InsertPlan {
    statement: InsertStatement,
    positions: PositionMap,
    defaults: Row,
    rows: Vec<Row>,
}

impl InsertPlan {
    /// Deep-copy the column templates and assign this plan's own dense
    /// positions — plans never share position state.
    fn prepare(table: &TableRef, template: &TypeTemplate) -> Self {
        let mut columns = fixed_columns();
        columns.extend(template.columns.iter().map(ColumnModel::deep_copy));
        let positions = PositionMap::assign(&columns);
        let leaves = flatten_leaves(&columns);
        debug_assert_eq!(positions.len(), leaves.len());
        let statement = InsertStatement {
            table: table.clone(),
            columns: leaves.iter().map(|c| c.name.clone()).collect(),
        };
        let defaults = Row(leaves.iter().map(|c| c.column_type.default_value()).collect());
        Self { statement, positions, defaults, rows: Vec::new() }
    }

    #[cfg(test)]
    pub(crate) fn positions(&self) -> &PositionMap {
        &self.positions
    }
}

pub struct BatchedWriter {
    destination: Arc<dyn DestinationClient>,
    table: TableRef,
    schema: Arc<TranslatedSchema>,
    codecs: CodecCache,
    plans: Vec<Option<InsertPlan>>,
    watermark: Option<(i64, i64)>,
    closed: bool,
}

impl BatchedWriter {
    pub fn new(
        destination: Arc<dyn DestinationClient>,
        table: TableRef,
        schema: Arc<TranslatedSchema>,
    ) -> Self {
        let type_count = schema.types.len();
        Self {
            destination,
            table,
            schema,
            codecs: CodecCache::new(type_count),
            plans: (0..type_count).map(|_| None).collect(),
            watermark: None,
            closed: false,
        }
    }

    /// Decode one record and append it to its type's pending batch.
    pub fn send(&mut self, record: &RawRecord) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Config("send on a closed writer".into()));
        }
        let idx = record.type_tag as usize;
        let schema = Arc::clone(&self.schema);
        let template = schema
            .types
            .get(idx)
            .ok_or_else(|| EngineError::Decode(format!("unknown type tag {}", record.type_tag)))?;
        if self.plans[idx].is_none() {
            self.plans[idx] = Some(InsertPlan::prepare(&self.table, template));
            tracing::debug!(table = %self.table, type_name = %template.type_name, "prepared insert plan");
        }
        let plan = self.plans[idx].as_mut().unwrap();

        // Start from the defaults so a previous row occupying this batch
        // slot can never leak through an absent optional field.
        let mut row = plan.defaults.clone();

        let mut cursor = WireCursor::new(&record.body);
        self.codecs.bind(record.type_tag, &schema, &mut cursor, &mut row.0)?;
        if cursor.remaining() != 0 {
            return Err(EngineError::Decode(format!(
                "record of type '{}' has {} trailing bytes",
                template.type_name,
                cursor.remaining()
            )));
        }

        row.0[0] = CellValue::Date(partition_date(record.timestamp));
        row.0[1] = CellValue::DateTime(record.timestamp);
        row.0[2] = CellValue::String(record.instrument.clone());
        row.0[3] = CellValue::String(template.type_name.clone());
        plan.rows.push(row);

        let ts = record.timestamp;
        self.watermark = Some(match self.watermark {
            None => (ts, ts),
            Some((min, max)) => (min.min(ts), max.max(ts)),
        });
        Ok(())
    }

    pub fn pending_rows(&self) -> usize {
        self.plans.iter().flatten().map(|p| p.rows.len()).sum()
    }

    /// Min/max timestamp of the buffered rows; `None` when nothing is
    /// buffered.
    pub fn watermark(&self) -> Option<(i64, i64)> {
        self.watermark
    }

    /// Execute every plan with a non-empty batch. The first failure is
    /// surfaced immediately with the failing statement's context; plans
    /// that already executed stay executed. The watermark resets only
    /// after a fully successful flush.
    pub async fn flush(&mut self) -> Result<(), EngineError> {
        let destination = Arc::clone(&self.destination);
        for plan in self.plans.iter_mut().flatten() {
            if plan.rows.is_empty() {
                continue;
            }
            destination.insert(&plan.statement, &plan.rows).await.map_err(|e| {
                EngineError::from(e.with_context(format!(
                    "insert into {} ({} rows, {} columns)",
                    plan.statement.table,
                    plan.rows.len(),
                    plan.statement.columns.len()
                )))
            })?;
            plan.rows.clear();
        }
        self.watermark = None;
        Ok(())
    }

    /// Flush what is buffered and release every plan. Safe to call after a
    /// partial or failed flush, and more than once.
    pub async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush().await;
        self.plans.clear();
        self.closed = true;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siphon_api::column::FIXED_COLUMN_COUNT;
    use siphon_api::schema::{Encoding, SourceField, SourceType, StreamSchema};

    use crate::translator::translate;

    fn stream() -> StreamSchema {
        StreamSchema {
            top_types: vec!["Trade".into()],
            types: vec![SourceType {
                name: "Trade".into(),
                parent: None,
                is_abstract: false,
                fields: vec![
                    SourceField::scalar("price", Encoding::Float64, true),
                    SourceField::scalar("size", Encoding::Int64, false),
                ],
            }],
        }
    }

    #[test]
    fn plan_statement_lists_fixed_columns_first() {
        let schema = translate(&stream(), 9).unwrap();
        let plan = InsertPlan::prepare(&TableRef::new("db", "trades"), &schema.types[0]);
        assert_eq!(
            plan.statement.columns,
            vec!["partition_date", "timestamp", "instrument", "type", "price_f64", "size_i64"]
        );
        assert_eq!(plan.defaults.0.len(), plan.statement.columns.len());
    }

    #[test]
    fn plan_positions_are_dense() {
        let schema = translate(&stream(), 9).unwrap();
        let plan = InsertPlan::prepare(&TableRef::new("db", "trades"), &schema.types[0]);
        let positions: Vec<u32> = plan.positions().iter().collect();
        assert_eq!(positions, (1..=FIXED_COLUMN_COUNT as u32 + 2).collect::<Vec<_>>());
    }

    #[test]
    fn partition_date_floors_toward_the_epoch() {
        assert_eq!(partition_date(0), 0);
        assert_eq!(partition_date(NANOS_PER_DAY - 1), 0);
        assert_eq!(partition_date(NANOS_PER_DAY), 1);
        assert_eq!(partition_date(-1), -1);
    }
}

//! Shared in-memory source and destination for the replication tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use siphon_api::column::{ColumnModel, ColumnType, flatten_leaves};
use siphon_api::destination::{DestinationClient, InsertStatement, TableRef};
use siphon_api::error::ReplicaError;
use siphon_api::schema::{Encoding, SourceField, SourceType, StreamSchema, TypeTag};
use siphon_api::source::{AvailabilityCallback, RawRecord, SourceClient, SourceCursor};
use siphon_api::value::{CellValue, Row};
use siphon_api::wire::WireWriter;

// ═══════════════════════════════════════════════════════════════
//  MemorySource
// ═══════════════════════════════════════════════════════════════

struct SourceState {
    queue: VecDeque<RawRecord>,
    callbacks: Vec<AvailabilityCallback>,
}

struct SourceInner {
    schema: StreamSchema,
    state: Mutex<SourceState>,
    finished: AtomicBool,
}

pub struct MemorySource {
    inner: Arc<SourceInner>,
}

impl MemorySource {
    pub fn new(schema: StreamSchema) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(SourceInner {
                schema,
                state: Mutex::new(SourceState { queue: VecDeque::new(), callbacks: Vec::new() }),
                finished: AtomicBool::new(false),
            }),
        })
    }

    /// Append a record and fire every registered availability callback.
    pub fn push(&self, record: RawRecord) {
        let callbacks: Vec<AvailabilityCallback> = {
            let mut state = self.inner.state.lock().unwrap();
            state.queue.push_back(record);
            state.callbacks.clone()
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Records not yet consumed by any cursor.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    /// Mark the stream as ended: cursors report exhaustion once drained.
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::SeqCst);
        let callbacks: Vec<AvailabilityCallback> =
            self.inner.state.lock().unwrap().callbacks.clone();
        for callback in callbacks {
            callback();
        }
    }
}

impl SourceClient for MemorySource {
    fn describe(&self, _stream: &str) -> Result<StreamSchema, ReplicaError> {
        Ok(self.inner.schema.clone())
    }

    fn open_cursor(
        &self,
        _stream: &str,
        from_exclusive: Option<i64>,
        _live: bool,
        on_available: AvailabilityCallback,
    ) -> Result<Box<dyn SourceCursor>, ReplicaError> {
        self.inner.state.lock().unwrap().callbacks.push(on_available);
        Ok(Box::new(MemoryCursor { inner: Arc::clone(&self.inner), from_exclusive }))
    }
}

struct MemoryCursor {
    inner: Arc<SourceInner>,
    from_exclusive: Option<i64>,
}

impl SourceCursor for MemoryCursor {
    fn poll_next(&mut self) -> Result<Option<RawRecord>, ReplicaError> {
        let mut state = self.inner.state.lock().unwrap();
        while let Some(record) = state.queue.pop_front() {
            if let Some(from) = self.from_exclusive {
                if record.timestamp <= from {
                    continue;
                }
            }
            return Ok(Some(record));
        }
        Ok(None)
    }

    fn is_exhausted(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
            && self.inner.state.lock().unwrap().queue.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDestination
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct TableState {
    pub columns: Vec<(String, ColumnType)>,
    pub rows: Vec<HashMap<String, CellValue>>,
}

#[derive(Default)]
pub struct DestState {
    pub databases: Vec<String>,
    pub tables: HashMap<String, TableState>,
    /// Insert batch sizes in arrival order.
    pub batches: Vec<usize>,
    pub fail_next_insert: bool,
}

#[derive(Default)]
pub struct MemoryDestination {
    state: Mutex<DestState>,
}

impl MemoryDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rows(&self, table: &str) -> Vec<HashMap<String, CellValue>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    pub fn fail_next_insert(&self) {
        self.state.lock().unwrap().fail_next_insert = true;
    }

    pub fn timestamps(&self, table: &str) -> Vec<i64> {
        self.rows(table)
            .iter()
            .map(|row| match row.get("timestamp") {
                Some(CellValue::DateTime(ts)) => *ts,
                other => panic!("missing timestamp cell: {other:?}"),
            })
            .collect()
    }
}

impl DestinationClient for MemoryDestination {
    fn ensure_database<'a>(
        &'a self,
        database: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if !state.databases.iter().any(|d| d == database) {
                state.databases.push(database.to_string());
            }
            Ok(())
        })
    }

    fn ensure_table<'a>(
        &'a self,
        table: &'a TableRef,
        columns: &'a [ColumnModel],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.tables.entry(table.to_string()).or_insert_with(|| TableState {
                columns: flatten_leaves(columns)
                    .iter()
                    .map(|c| (c.name.clone(), c.column_type.clone()))
                    .collect(),
                rows: Vec::new(),
            });
            Ok(())
        })
    }

    fn describe_table<'a>(
        &'a self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<(String, ColumnType)>>, ReplicaError>> + Send + 'a>>
    {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(state.tables.get(&table.to_string()).map(|t| t.columns.clone()))
        })
    }

    fn timestamp_range<'a>(
        &'a self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(i64, i64)>, ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let timestamps = self.timestamps(&table.to_string());
            Ok(timestamps
                .iter()
                .copied()
                .min()
                .zip(timestamps.iter().copied().max()))
        })
    }

    fn delete_at<'a>(
        &'a self,
        table: &'a TableRef,
        timestamp: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(t) = state.tables.get_mut(&table.to_string()) {
                t.rows.retain(|row| row.get("timestamp") != Some(&CellValue::DateTime(timestamp)));
            }
            Ok(())
        })
    }

    fn insert<'a>(
        &'a self,
        statement: &'a InsertStatement,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail_next_insert {
                state.fail_next_insert = false;
                return Err(ReplicaError::io("injected insert failure"));
            }
            let table = state
                .tables
                .get_mut(&statement.table.to_string())
                .ok_or_else(|| ReplicaError::io(format!("no such table {}", statement.table)))?;
            for row in rows {
                assert_eq!(statement.columns.len(), row.0.len(), "positional mismatch");
                table
                    .rows
                    .push(statement.columns.iter().cloned().zip(row.0.iter().cloned()).collect());
            }
            state.batches.push(rows.len());
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schemas and record encoders
// ═══════════════════════════════════════════════════════════════

pub fn trade_schema() -> StreamSchema {
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

pub fn trade(timestamp: i64, instrument: &str, price: Option<f64>, size: i64) -> RawRecord {
    let mut w = WireWriter::new();
    w.write_f64(price).unwrap();
    w.write_i64(Some(size)).unwrap();
    RawRecord {
        timestamp,
        instrument: instrument.to_string(),
        type_tag: 0,
        body: w.into_bytes(),
    }
}

/// Parent with an optional polymorphic `leg` object ({A, B}).
pub fn nested_schema() -> StreamSchema {
    StreamSchema {
        top_types: vec!["Parent".into()],
        types: vec![
            SourceType {
                name: "Parent".into(),
                parent: None,
                is_abstract: false,
                fields: vec![
                    SourceField::scalar("seq", Encoding::Int64, false),
                    SourceField::object("leg", vec!["A".into(), "B".into()], true),
                ],
            },
            SourceType {
                name: "A".into(),
                parent: None,
                is_abstract: false,
                fields: vec![SourceField::scalar("x", Encoding::Int32, true)],
            },
            SourceType {
                name: "B".into(),
                parent: None,
                is_abstract: false,
                fields: vec![SourceField::scalar("y", Encoding::Float64, true)],
            },
        ],
    }
}

pub fn parent_record(
    timestamp: i64,
    seq: i64,
    leg: Option<(TypeTag, CellValue)>,
) -> RawRecord {
    let mut w = WireWriter::new();
    w.write_i64(Some(seq)).unwrap();
    match leg {
        None => w.write_object_tag(None).unwrap(),
        Some((tag, value)) => {
            w.write_object_tag(Some(tag)).unwrap();
            match value {
                CellValue::Int32(x) => w.write_i32(Some(x)).unwrap(),
                CellValue::Float64(y) => w.write_f64(Some(y)).unwrap(),
                other => panic!("unsupported leg payload {other:?}"),
            }
        }
    }
    RawRecord { timestamp, instrument: "SPOT".into(), type_tag: 0, body: w.into_bytes() }
}

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::column::{ColumnModel, ColumnType};
use crate::error::ReplicaError;
use crate::value::Row;

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self { database: database.into(), table: table.into() }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Prepared positional insert: row cells are bound 1:1, in order, to the
/// named leaf columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableRef,
    pub columns: Vec<String>,
}

/// Destination store client. The narrow surface the replication core
/// consumes; everything else about the destination stays behind it.
pub trait DestinationClient: Send + Sync {
    /// Create the database if absent. Idempotent.
    fn ensure_database<'a>(
        &'a self,
        database: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>>;

    /// Create the table if absent from the given column list (groups are
    /// flattened to leaves). Never drops or alters an existing table.
    fn ensure_table<'a>(
        &'a self,
        table: &'a TableRef,
        columns: &'a [ColumnModel],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>>;

    /// Leaf columns of an existing table, or `None` if the table does not
    /// exist.
    fn describe_table<'a>(
        &'a self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<(String, ColumnType)>>, ReplicaError>> + Send + 'a>>;

    /// Min/max of the timestamp column, or `None` for an empty table.
    /// Values are nanoseconds since the Unix epoch.
    fn timestamp_range<'a>(
        &'a self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(i64, i64)>, ReplicaError>> + Send + 'a>>;

    /// Delete every row carrying exactly this timestamp.
    fn delete_at<'a>(
        &'a self,
        table: &'a TableRef,
        timestamp: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>>;

    /// Execute one batched insert.
    fn insert<'a>(
        &'a self,
        statement: &'a InsertStatement,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplicaError>> + Send + 'a>>;
}

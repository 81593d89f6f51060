//! DDL rendering for the destination table.
//!
//! Groups never reach the destination as such — the table is created from
//! the flattened leaf columns, partitioned by the fixed partition-date
//! column and ordered by (timestamp, instrument, type) for time-range and
//! entity-range pruning.

use siphon_api::column::{
    ColumnModel, ColumnType, DECIMAL_PRECISION, INSTRUMENT_COLUMN, PARTITION_DATE_COLUMN,
    TIMESTAMP_COLUMN, TIMESTAMP_PRECISION, TYPE_COLUMN, flatten_leaves,
};
use siphon_api::destination::TableRef;
use siphon_api::error::ReplicaError;

use crate::literal::escape_string;

/// Backtick-quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "\\`"))
}

pub fn quote_table(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.database), quote_ident(&table.table))
}

/// Destination type string of one leaf column type.
pub fn render_column_type(ty: &ColumnType) -> Result<String, ReplicaError> {
    Ok(match ty {
        ColumnType::Int8 => "Int8".into(),
        ColumnType::Int16 => "Int16".into(),
        ColumnType::Int32 => "Int32".into(),
        ColumnType::Int64 => "Int64".into(),
        ColumnType::Float32 => "Float32".into(),
        ColumnType::Float64 => "Float64".into(),
        ColumnType::Decimal { scale } => format!("Decimal({DECIMAL_PRECISION}, {scale})"),
        ColumnType::Bool => "UInt8".into(),
        ColumnType::String => "String".into(),
        ColumnType::Date => "Date".into(),
        ColumnType::DateTime => format!("DateTime64({TIMESTAMP_PRECISION})"),
        ColumnType::Time => "Int32".into(),
        ColumnType::Enum16(symbols) => {
            let pairs: Vec<String> = symbols
                .iter()
                .map(|(symbol, ordinal)| format!("'{}' = {ordinal}", escape_string(symbol)))
                .collect();
            format!("Enum16({})", pairs.join(", "))
        }
        ColumnType::Nullable(inner) => format!("Nullable({})", render_column_type(inner)?),
        ColumnType::Array(inner) => format!("Array({})", render_column_type(inner)?),
        ColumnType::ObjectGroup(_) | ColumnType::NestedGroup(_) => {
            return Err(ReplicaError::schema(
                "group columns have no destination type; flatten to leaves first",
            ));
        }
    })
}

/// `CREATE TABLE IF NOT EXISTS` over the flattened leaf columns.
pub fn render_create_table(
    table: &TableRef,
    columns: &[ColumnModel],
) -> Result<String, ReplicaError> {
    let mut definitions = Vec::new();
    for leaf in flatten_leaves(columns) {
        definitions.push(format!(
            "    {} {}",
            quote_ident(&leaf.name),
            render_column_type(&leaf.column_type)?
        ));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n) ENGINE = MergeTree\nPARTITION BY {}\nORDER BY ({}, {}, {})",
        quote_table(table),
        definitions.join(",\n"),
        quote_ident(PARTITION_DATE_COLUMN),
        quote_ident(TIMESTAMP_COLUMN),
        quote_ident(INSTRUMENT_COLUMN),
        quote_ident(TYPE_COLUMN),
    ))
}

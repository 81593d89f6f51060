//! SQL literal rendering for batched inserts.

use chrono::{DateTime, Utc};

use siphon_api::error::ReplicaError;
use siphon_api::value::{CellValue, Row};

const SECONDS_PER_DAY: i64 = 86_400;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Escape a string value for safe use inside a single-quoted literal.
/// Prevents SQL injection by escaping `\` and `'`.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

fn render_date(days: i32) -> Result<String, ReplicaError> {
    let ts = DateTime::<Utc>::from_timestamp(days as i64 * SECONDS_PER_DAY, 0)
        .ok_or_else(|| ReplicaError::io(format!("date {days} is out of range")))?;
    Ok(format!("'{}'", ts.format("%Y-%m-%d")))
}

fn render_datetime(nanos: i64) -> Result<String, ReplicaError> {
    let secs = nanos.div_euclid(NANOS_PER_SECOND);
    let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    let ts = DateTime::<Utc>::from_timestamp(secs, subsec)
        .ok_or_else(|| ReplicaError::io(format!("timestamp {nanos} is out of range")))?;
    Ok(format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.9f")))
}

fn render_decimal(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let divisor = 10i128.pow(scale as u32);
    let sign = if mantissa < 0 { "-" } else { "" };
    let magnitude = mantissa.unsigned_abs();
    let divisor = divisor as u128;
    format!(
        "{sign}{}.{:0width$}",
        magnitude / divisor,
        magnitude % divisor,
        width = scale as usize
    )
}

/// Render one cell as a SQL literal.
pub fn render_value(value: &CellValue) -> Result<String, ReplicaError> {
    Ok(match value {
        CellValue::Null => "NULL".into(),
        CellValue::Bool(true) => "1".into(),
        CellValue::Bool(false) => "0".into(),
        CellValue::Int8(v) => v.to_string(),
        CellValue::Int16(v) => v.to_string(),
        CellValue::Int32(v) => v.to_string(),
        CellValue::Int64(v) => v.to_string(),
        CellValue::Float32(v) => v.to_string(),
        CellValue::Float64(v) => v.to_string(),
        CellValue::Decimal(mantissa, scale) => render_decimal(*mantissa, *scale),
        CellValue::String(s) => format!("'{}'", escape_string(s)),
        CellValue::Bytes(b) => format!("unhex('{}')", hex(b)),
        CellValue::Date(days) => render_date(*days)?,
        CellValue::DateTime(nanos) => render_datetime(*nanos)?,
        CellValue::Time(millis) => millis.to_string(),
        CellValue::Enum(ordinal) => ordinal.to_string(),
        CellValue::Array(items) => {
            let rendered: Result<Vec<String>, ReplicaError> = items.iter().map(render_value).collect();
            format!("[{}]", rendered?.join(", "))
        }
    })
}

/// Render one positional row: `(v1, v2, …)`.
pub fn render_row(row: &Row) -> Result<String, ReplicaError> {
    let rendered: Result<Vec<String>, ReplicaError> = row.0.iter().map(render_value).collect();
    Ok(format!("({})", rendered?.join(", ")))
}

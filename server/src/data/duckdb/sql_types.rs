//! SQL type wrappers for DuckDB appends
//!
//! DuckDB casts text into TIMESTAMP columns during appends, so timestamps
//! and attribute maps are bound as formatted text.

use chrono::{DateTime, Utc};
use duckdb::types::{ToSqlOutput, Value, ValueRef};
use duckdb::ToSql;

use super::flatten::AttrMap;

/// Microsecond-precision text format DuckDB accepts for TIMESTAMP columns
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Wrapper for DateTime<Utc> to bind as DuckDB TIMESTAMP
pub struct SqlTimestamp(pub DateTime<Utc>);

impl ToSql for SqlTimestamp {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let ts = self.0.format(TIMESTAMP_FORMAT).to_string();
        Ok(ToSqlOutput::Owned(Value::Text(ts)))
    }
}

/// Wrapper for attribute maps: JSON-object text, NULL when empty
pub struct SqlAttrMap<'a>(pub &'a AttrMap);

impl ToSql for SqlAttrMap<'_> {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        if self.0.is_empty() {
            return Ok(ToSqlOutput::Borrowed(ValueRef::Null));
        }
        Ok(ToSqlOutput::Owned(Value::Text(self.0.to_json())))
    }
}

/// Convert OTLP nanoseconds to a UTC timestamp. Zero maps to the epoch;
/// sub-microsecond precision is dropped at format time.
pub fn unix_nano_to_datetime(nanos: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(
        (nanos / 1_000_000_000) as i64,
        (nanos % 1_000_000_000) as u32,
    )
    .unwrap_or(DateTime::UNIX_EPOCH)
}

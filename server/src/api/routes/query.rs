//! Read-only SQL query endpoint (`POST /query`)
//!
//! A diagnostic port, deliberately restricted: single SELECT/WITH
//! statement, blocked introspection keywords, a default LIMIT, and a hard
//! five-second timeout. Engine error text goes back verbatim; the endpoint
//! sits behind the `read` scope.

use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::api::auth::error_response;
use crate::api::middleware::RequestId;
use crate::api::AppState;
use crate::core::constants::{QUERY_ROW_LIMIT, QUERY_TIMEOUT_SECS};

const BLOCKED_KEYWORDS: [&str; 6] = [
    "EXPLAIN", "DESCRIBE", "SHOW", "PRAGMA", "ATTACH", "DETACH",
];

#[derive(Deserialize)]
pub struct QueryForm {
    #[serde(default)]
    sql: String,
}

#[derive(Debug)]
enum QueryError {
    /// Engine rejected or failed the statement; message goes to the client
    Execute(String),
    Scan(String),
}

#[derive(Debug)]
struct QueryOutput {
    columns: Vec<String>,
    rows: Vec<serde_json::Map<String, JsonValue>>,
}

pub async fn query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Form(form): Form<QueryForm>,
) -> Response {
    let sql = match prepare_sql(&form.sql) {
        Ok(sql) => sql,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    let store = state.store.clone();
    let task = tokio::task::spawn_blocking(move || {
        let conn = store.conn();
        execute_query(&conn, &sql)
    });

    match tokio::time::timeout(Duration::from_secs(QUERY_TIMEOUT_SECS), task).await {
        Err(_) => {
            tracing::warn!(request_id = %request_id.as_str(), "query timed out");
            error_response(
                StatusCode::BAD_REQUEST,
                &format!("query timed out after {QUERY_TIMEOUT_SECS}s"),
            )
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id.as_str(), error = %e, "query task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "query execution failed")
        }
        Ok(Ok(Err(QueryError::Execute(msg)))) => {
            tracing::warn!(request_id = %request_id.as_str(), error = %msg, "query error");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
        Ok(Ok(Err(QueryError::Scan(msg)))) => {
            tracing::error!(request_id = %request_id.as_str(), error = %msg, "scan error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to scan row")
        }
        Ok(Ok(Ok(output))) => Json(json!({
            "columns": output.columns,
            "rows": output.rows,
            "count": output.rows.len(),
        }))
        .into_response(),
    }
}

/// Validate the statement and append the default LIMIT when absent
fn prepare_sql(input: &str) -> Result<String, &'static str> {
    let sql = input.trim();
    if sql.is_empty() {
        return Err("missing sql parameter");
    }

    let upper = sql.to_uppercase();
    if !upper.starts_with("SELECT") && !upper.starts_with("WITH") {
        return Err("only SELECT queries allowed");
    }

    if sql.contains(';') {
        return Err("multi-statement queries not allowed");
    }

    for keyword in BLOCKED_KEYWORDS {
        if upper.contains(keyword) {
            return Err("query contains a blocked keyword");
        }
    }

    if upper.contains("LIMIT") {
        Ok(sql.to_string())
    } else {
        Ok(format!("{sql} LIMIT {QUERY_ROW_LIMIT}"))
    }
}

fn execute_query(conn: &Connection, sql: &str) -> Result<QueryOutput, QueryError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| QueryError::Execute(e.to_string()))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| QueryError::Execute(e.to_string()))?;

    let columns: Vec<String> = rows
        .as_ref()
        .map(|s| s.column_names().iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();

    let mut out = Vec::new();
    loop {
        let row = match rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(QueryError::Scan(e.to_string())),
        };

        let mut object = serde_json::Map::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| QueryError::Scan(e.to_string()))?;
            object.insert(column.clone(), value_ref_to_json(value));
        }
        out.push(object);
    }

    Ok(QueryOutput { columns, rows: out })
}

fn value_ref_to_json(value: ValueRef) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Boolean(b) => json!(b),
        ValueRef::TinyInt(i) => json!(i),
        ValueRef::SmallInt(i) => json!(i),
        ValueRef::Int(i) => json!(i),
        ValueRef::BigInt(i) => json!(i),
        ValueRef::HugeInt(i) => json!(i.to_string()),
        ValueRef::UTinyInt(u) => json!(u),
        ValueRef::USmallInt(u) => json!(u),
        ValueRef::UInt(u) => json!(u),
        ValueRef::UBigInt(u) => json!(u),
        ValueRef::Float(f) => json!(f),
        ValueRef::Double(d) => json!(d),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::String(hex::encode(b)),
        ValueRef::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            match chrono::DateTime::from_timestamp_micros(micros) {
                Some(dt) => json!(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
                None => json!(v),
            }
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}

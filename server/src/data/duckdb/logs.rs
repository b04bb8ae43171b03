//! Log persistence via bulk appender
//!
//! Each record gets a fresh UUID `log_id`. Nanosecond timestamps convert to
//! microsecond-precision timestamps; the body splits into plain text or a
//! flat field map depending on the OTLP body variant.

use chrono::Utc;
use duckdb::{params, Connection};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::flatten::{extract_log_body, flatten_attributes, hex_id};
use super::sql_types::{unix_nano_to_datetime, SqlAttrMap, SqlTimestamp};
use super::traces::scope_parts;

pub(super) fn append_logs(
    conn: &Connection,
    req: &ExportLogsServiceRequest,
) -> Result<StoreResult, StoreError> {
    if req.resource_logs.is_empty() {
        return Ok(StoreResult::default());
    }

    let mut appender = conn
        .appender("logs")
        .map_err(|e| StoreError::infrastructure("failed to open logs appender", e))?;

    let mut result = StoreResult::default();
    let now = Utc::now();

    for rl in &req.resource_logs {
        let resource_attrs = rl
            .resource
            .as_ref()
            .map(|r| flatten_attributes(&r.attributes))
            .unwrap_or_default();
        let resource_schema_url = rl.schema_url.as_str();

        for sl in &rl.scope_logs {
            let (scope_name, scope_version, scope_attrs) = scope_parts(sl.scope.as_ref());
            let scope_schema_url = sl.schema_url.as_str();

            for record in &sl.log_records {
                let log_id = Uuid::new_v4().to_string();
                let (body, body_fields) = extract_log_body(record.body.as_ref());
                let attrs = flatten_attributes(&record.attributes);

                let append = appender.append_row(params![
                    log_id.as_str(),
                    hex_id(&record.trace_id),
                    hex_id(&record.span_id),
                    SqlTimestamp(unix_nano_to_datetime(record.time_unix_nano)),
                    SqlTimestamp(unix_nano_to_datetime(record.observed_time_unix_nano)),
                    record.severity_number as i8,
                    record.severity_text.as_str(),
                    body.as_str(),
                    SqlAttrMap(&body_fields),
                    SqlAttrMap(&resource_attrs),
                    resource_schema_url,
                    scope_name,
                    scope_version,
                    SqlAttrMap(&scope_attrs),
                    scope_schema_url,
                    SqlAttrMap(&attrs),
                    record.dropped_attributes_count as i32,
                    record.flags as i32,
                    SqlTimestamp(now),
                ]);
                if let Err(e) = append {
                    result.add_error(format!("log {log_id}: {e}"));
                    continue;
                }
                result.accepted += 1;
            }
        }
    }

    appender
        .flush()
        .map_err(|e| StoreError::infrastructure("failed to flush logs", e))?;

    Ok(result)
}

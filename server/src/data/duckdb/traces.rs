//! Trace persistence via bulk appenders
//!
//! One request uses three appenders (spans, span_events, span_links) over
//! the same connection; all three flush at the end. A bad span row is
//! rejected and counted; a bad event or link row never invalidates its
//! parent span.

use chrono::Utc;
use duckdb::{params, Connection};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;

use super::error::{StoreError, StoreResult};
use super::flatten::{flatten_attributes, hex_id, AttrMap};
use super::sql_types::{unix_nano_to_datetime, SqlAttrMap, SqlTimestamp};

pub(super) fn scope_parts(scope: Option<&InstrumentationScope>) -> (&str, &str, AttrMap) {
    match scope {
        Some(s) => (
            s.name.as_str(),
            s.version.as_str(),
            flatten_attributes(&s.attributes),
        ),
        None => ("", "", AttrMap::default()),
    }
}

pub(super) fn append_traces(
    conn: &Connection,
    req: &ExportTraceServiceRequest,
) -> Result<StoreResult, StoreError> {
    if req.resource_spans.is_empty() {
        return Ok(StoreResult::default());
    }

    let mut span_appender = conn
        .appender("spans")
        .map_err(|e| StoreError::infrastructure("failed to open spans appender", e))?;
    let mut event_appender = conn
        .appender("span_events")
        .map_err(|e| StoreError::infrastructure("failed to open span_events appender", e))?;
    let mut link_appender = conn
        .appender("span_links")
        .map_err(|e| StoreError::infrastructure("failed to open span_links appender", e))?;

    let mut result = StoreResult::default();
    let now = Utc::now();

    for rs in &req.resource_spans {
        let resource_attrs = rs
            .resource
            .as_ref()
            .map(|r| flatten_attributes(&r.attributes))
            .unwrap_or_default();
        let resource_schema_url = rs.schema_url.as_str();

        for ss in &rs.scope_spans {
            let (scope_name, scope_version, scope_attrs) = scope_parts(ss.scope.as_ref());
            let scope_schema_url = ss.schema_url.as_str();

            for span in &ss.spans {
                let trace_id = hex_id(&span.trace_id);
                let span_id = hex_id(&span.span_id);

                let (status_code, status_message) = span
                    .status
                    .as_ref()
                    .map(|s| (s.code as i8, s.message.as_str()))
                    .unwrap_or((0, ""));

                let duration_ns =
                    span.end_time_unix_nano as i64 - span.start_time_unix_nano as i64;

                let span_attrs = flatten_attributes(&span.attributes);
                let append = span_appender.append_row(params![
                    trace_id.as_str(),
                    span_id.as_str(),
                    hex_id(&span.parent_span_id),
                    SqlTimestamp(unix_nano_to_datetime(span.start_time_unix_nano)),
                    SqlTimestamp(unix_nano_to_datetime(span.end_time_unix_nano)),
                    duration_ns,
                    span.name.as_str(),
                    span.kind as i8,
                    status_code,
                    status_message,
                    SqlAttrMap(&resource_attrs),
                    resource_schema_url,
                    scope_name,
                    scope_version,
                    SqlAttrMap(&scope_attrs),
                    scope_schema_url,
                    SqlAttrMap(&span_attrs),
                    span.dropped_attributes_count as i32,
                    SqlTimestamp(now),
                ]);
                if let Err(e) = append {
                    result.add_error(format!("span {span_id}: {e}"));
                    continue;
                }
                result.accepted += 1;

                for event in &span.events {
                    let event_attrs = flatten_attributes(&event.attributes);
                    let append = event_appender.append_row(params![
                        trace_id.as_str(),
                        span_id.as_str(),
                        SqlTimestamp(unix_nano_to_datetime(event.time_unix_nano)),
                        event.name.as_str(),
                        SqlAttrMap(&event_attrs),
                        event.dropped_attributes_count as i32,
                        SqlTimestamp(now),
                    ]);
                    if let Err(e) = append {
                        // Event failures never reject the parent span
                        result
                            .errors
                            .push(format!("event {span_id}/{}: {e}", event.name));
                    }
                }

                for link in &span.links {
                    let link_attrs = flatten_attributes(&link.attributes);
                    let append = link_appender.append_row(params![
                        trace_id.as_str(),
                        span_id.as_str(),
                        hex_id(&link.trace_id),
                        hex_id(&link.span_id),
                        link.trace_state.as_str(),
                        SqlAttrMap(&link_attrs),
                        link.dropped_attributes_count as i32,
                        SqlTimestamp(now),
                    ]);
                    if let Err(e) = append {
                        result.errors.push(format!("link {span_id}: {e}"));
                    }
                }
            }
        }
    }

    span_appender
        .flush()
        .map_err(|e| StoreError::infrastructure("failed to flush spans", e))?;
    event_appender
        .flush()
        .map_err(|e| StoreError::infrastructure("failed to flush span events", e))?;
    link_appender
        .flush()
        .map_err(|e| StoreError::infrastructure("failed to flush span links", e))?;

    Ok(result)
}

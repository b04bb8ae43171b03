//! SQL schema for OTLP telemetry storage
//!
//! Five tables: spans, span_events, span_links, logs, metrics. Every table
//! carries an `ingested_at` timestamp used only by retention. Attribute
//! maps are stored as JSON-object text in VARCHAR columns (see sql_types).

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS spans (
    trace_id VARCHAR NOT NULL,
    span_id VARCHAR NOT NULL,
    parent_span_id VARCHAR,

    -- Microsecond precision, converted from OTLP nanoseconds
    start_time TIMESTAMP NOT NULL,
    end_time TIMESTAMP NOT NULL,
    duration_ns BIGINT NOT NULL,

    name VARCHAR NOT NULL,
    kind TINYINT NOT NULL,
    status_code TINYINT,
    status_message VARCHAR,

    resource_attrs VARCHAR,
    resource_schema_url VARCHAR,

    scope_name VARCHAR,
    scope_version VARCHAR,
    scope_attrs VARCHAR,
    scope_schema_url VARCHAR,

    attrs VARCHAR,
    dropped_attrs_count INTEGER,

    ingested_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_spans_trace_id ON spans(trace_id);
CREATE INDEX IF NOT EXISTS idx_spans_start_time ON spans(start_time);
CREATE INDEX IF NOT EXISTS idx_spans_name ON spans(name);

CREATE TABLE IF NOT EXISTS span_events (
    -- Parent span reference
    trace_id VARCHAR NOT NULL,
    span_id VARCHAR NOT NULL,

    event_time TIMESTAMP NOT NULL,
    event_name VARCHAR NOT NULL,
    event_attrs VARCHAR,
    dropped_attrs_count INTEGER,

    ingested_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_span_events_trace_span ON span_events(trace_id, span_id);
CREATE INDEX IF NOT EXISTS idx_span_events_name ON span_events(event_name);
CREATE INDEX IF NOT EXISTS idx_span_events_time ON span_events(event_time);

CREATE TABLE IF NOT EXISTS span_links (
    -- Source span reference
    trace_id VARCHAR NOT NULL,
    span_id VARCHAR NOT NULL,

    linked_trace_id VARCHAR NOT NULL,
    linked_span_id VARCHAR NOT NULL,
    trace_state VARCHAR,

    link_attrs VARCHAR,
    dropped_attrs_count INTEGER,

    ingested_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_span_links_trace_span ON span_links(trace_id, span_id);
CREATE INDEX IF NOT EXISTS idx_span_links_linked ON span_links(linked_trace_id, linked_span_id);

CREATE TABLE IF NOT EXISTS logs (
    log_id VARCHAR NOT NULL,
    trace_id VARCHAR,
    span_id VARCHAR,

    timestamp TIMESTAMP NOT NULL,
    observed_timestamp TIMESTAMP,

    severity_number TINYINT,
    severity_text VARCHAR,
    body VARCHAR,
    body_fields VARCHAR,

    resource_attrs VARCHAR,
    resource_schema_url VARCHAR,

    scope_name VARCHAR,
    scope_version VARCHAR,
    scope_attrs VARCHAR,
    scope_schema_url VARCHAR,

    attrs VARCHAR,
    dropped_attrs_count INTEGER,

    flags INTEGER,

    ingested_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_trace_id ON logs(trace_id);
CREATE INDEX IF NOT EXISTS idx_logs_severity ON logs(severity_number);

CREATE TABLE IF NOT EXISTS metrics (
    metric_id VARCHAR NOT NULL,

    timestamp TIMESTAMP NOT NULL,

    name VARCHAR NOT NULL,
    description VARCHAR,
    unit VARCHAR,
    type TINYINT NOT NULL,

    -- Meaningful for gauge and sum only
    value DOUBLE,

    -- Sum-specific
    is_monotonic BOOLEAN,

    -- Histogram-specific, queried as a complete unit
    histogram_json VARCHAR,

    resource_attrs VARCHAR,
    resource_schema_url VARCHAR,

    scope_name VARCHAR,
    scope_version VARCHAR,
    scope_attrs VARCHAR,
    scope_schema_url VARCHAR,

    attrs VARCHAR,

    ingested_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(name);
CREATE INDEX IF NOT EXISTS idx_metrics_type ON metrics(type);
";

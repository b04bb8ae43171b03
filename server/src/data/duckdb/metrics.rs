//! Metric persistence via bulk appender
//!
//! Dispatches on the OTLP metric kind: gauge and sum flatten their number
//! data points (ints coerced to double), histograms serialize their shape
//! into `histogram_json`. Summary and exponential-histogram points are
//! recognized but skipped.

use chrono::{DateTime, Utc};
use duckdb::{params, Appender, Connection};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::metrics::v1::{
    metric, number_data_point, HistogramDataPoint, Metric, NumberDataPoint,
};
use serde::Serialize;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::flatten::{flatten_attributes, AttrMap};
use super::sql_types::{unix_nano_to_datetime, SqlAttrMap, SqlTimestamp};
use super::traces::scope_parts;

pub const METRIC_TYPE_GAUGE: i8 = 1;
pub const METRIC_TYPE_SUM: i8 = 2;
pub const METRIC_TYPE_HISTOGRAM: i8 = 3;

/// Histogram shape stored as a complete JSON unit
#[derive(Debug, Serialize)]
struct HistogramJson {
    count: i64,
    sum: f64,
    bucket_counts: Vec<i64>,
    explicit_bounds: Vec<f64>,
}

/// Denormalized resource/scope context shared by every row of one request
struct RowContext<'a> {
    resource_attrs: &'a AttrMap,
    resource_schema_url: &'a str,
    scope_name: &'a str,
    scope_version: &'a str,
    scope_attrs: &'a AttrMap,
    scope_schema_url: &'a str,
    now: DateTime<Utc>,
}

pub(super) fn append_metrics(
    conn: &Connection,
    req: &ExportMetricsServiceRequest,
) -> Result<StoreResult, StoreError> {
    if req.resource_metrics.is_empty() {
        return Ok(StoreResult::default());
    }

    let mut appender = conn
        .appender("metrics")
        .map_err(|e| StoreError::infrastructure("failed to open metrics appender", e))?;

    let mut result = StoreResult::default();
    let now = Utc::now();

    for rm in &req.resource_metrics {
        let resource_attrs = rm
            .resource
            .as_ref()
            .map(|r| flatten_attributes(&r.attributes))
            .unwrap_or_default();

        for sm in &rm.scope_metrics {
            let (scope_name, scope_version, scope_attrs) = scope_parts(sm.scope.as_ref());

            let ctx = RowContext {
                resource_attrs: &resource_attrs,
                resource_schema_url: rm.schema_url.as_str(),
                scope_name,
                scope_version,
                scope_attrs: &scope_attrs,
                scope_schema_url: sm.schema_url.as_str(),
                now,
            };

            for m in &sm.metrics {
                append_metric_data_points(&mut appender, m, &ctx, &mut result);
            }
        }
    }

    appender
        .flush()
        .map_err(|e| StoreError::infrastructure("failed to flush metrics", e))?;

    Ok(result)
}

fn append_metric_data_points(
    appender: &mut Appender,
    m: &Metric,
    ctx: &RowContext,
    result: &mut StoreResult,
) {
    match &m.data {
        Some(metric::Data::Gauge(gauge)) => {
            append_number_data_points(
                appender,
                m,
                &gauge.data_points,
                METRIC_TYPE_GAUGE,
                false,
                ctx,
                result,
            );
        }
        Some(metric::Data::Sum(sum)) => {
            append_number_data_points(
                appender,
                m,
                &sum.data_points,
                METRIC_TYPE_SUM,
                sum.is_monotonic,
                ctx,
                result,
            );
        }
        Some(metric::Data::Histogram(histogram)) => {
            append_histogram_data_points(appender, m, &histogram.data_points, ctx, result);
        }
        // Summary and exponential-histogram points are skipped, not rejected
        _ => {}
    }
}

fn append_number_data_points(
    appender: &mut Appender,
    m: &Metric,
    data_points: &[NumberDataPoint],
    metric_type: i8,
    is_monotonic: bool,
    ctx: &RowContext,
    result: &mut StoreResult,
) {
    for dp in data_points {
        let metric_id = Uuid::new_v4().to_string();

        let value = match dp.value {
            Some(number_data_point::Value::AsDouble(d)) => d,
            Some(number_data_point::Value::AsInt(i)) => i as f64,
            None => 0.0,
        };

        let attrs = flatten_attributes(&dp.attributes);
        let append = appender.append_row(params![
            metric_id.as_str(),
            SqlTimestamp(unix_nano_to_datetime(dp.time_unix_nano)),
            m.name.as_str(),
            m.description.as_str(),
            m.unit.as_str(),
            metric_type,
            value,
            is_monotonic,
            // No histogram JSON for gauge/sum
            "",
            SqlAttrMap(ctx.resource_attrs),
            ctx.resource_schema_url,
            ctx.scope_name,
            ctx.scope_version,
            SqlAttrMap(ctx.scope_attrs),
            ctx.scope_schema_url,
            SqlAttrMap(&attrs),
            SqlTimestamp(ctx.now),
        ]);
        if let Err(e) = append {
            result.add_error(format!("metric {}/{metric_id}: {e}", m.name));
            continue;
        }
        result.accepted += 1;
    }
}

fn append_histogram_data_points(
    appender: &mut Appender,
    m: &Metric,
    data_points: &[HistogramDataPoint],
    ctx: &RowContext,
    result: &mut StoreResult,
) {
    for dp in data_points {
        let metric_id = Uuid::new_v4().to_string();

        let histogram = HistogramJson {
            count: dp.count as i64,
            sum: dp.sum.unwrap_or(0.0),
            bucket_counts: dp.bucket_counts.iter().map(|&c| c as i64).collect(),
            explicit_bounds: dp.explicit_bounds.clone(),
        };
        let histogram_json =
            serde_json::to_string(&histogram).unwrap_or_else(|_| String::new());

        let attrs = flatten_attributes(&dp.attributes);
        let append = appender.append_row(params![
            metric_id.as_str(),
            SqlTimestamp(unix_nano_to_datetime(dp.time_unix_nano)),
            m.name.as_str(),
            m.description.as_str(),
            m.unit.as_str(),
            METRIC_TYPE_HISTOGRAM,
            0.0_f64,
            false,
            histogram_json.as_str(),
            SqlAttrMap(ctx.resource_attrs),
            ctx.resource_schema_url,
            ctx.scope_name,
            ctx.scope_version,
            SqlAttrMap(ctx.scope_attrs),
            ctx.scope_schema_url,
            SqlAttrMap(&attrs),
            SqlTimestamp(ctx.now),
        ]);
        if let Err(e) = append {
            result.add_error(format!("histogram {}/{metric_id}: {e}", m.name));
            continue;
        }
        result.accepted += 1;
    }
}

//! Storage stats endpoint (`GET /stats`)

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::auth::error_response;
use crate::api::AppState;
use crate::data::duckdb::CleanupResult;

#[derive(Serialize)]
pub struct StatsResponse {
    pub database: DatabaseStats,
    pub tables: TableStats,
    pub retention: RetentionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupStats>,
}

#[derive(Serialize)]
pub struct DatabaseStats {
    pub path: String,
    pub size_bytes: u64,
    pub wal_size_bytes: u64,
}

#[derive(Serialize)]
pub struct TableStats {
    pub spans: i64,
    pub span_events: i64,
    pub span_links: i64,
    pub logs: i64,
    pub metrics: i64,
}

#[derive(Serialize)]
pub struct RetentionStats {
    pub enabled: bool,
    pub hours: u64,
    pub cleanup_interval_mins: u64,
}

#[derive(Serialize)]
pub struct CleanupStats {
    pub last_run: String,
    pub last_duration_ms: u64,
    pub last_result: CleanupCountStats,
}

#[derive(Serialize)]
pub struct CleanupCountStats {
    pub spans_deleted: u64,
    pub span_events_deleted: u64,
    pub span_links_deleted: u64,
    pub logs_deleted: u64,
    pub metrics_deleted: u64,
}

impl From<&CleanupResult> for CleanupStats {
    fn from(result: &CleanupResult) -> Self {
        Self {
            last_run: result.timestamp.to_rfc3339(),
            last_duration_ms: result.duration.as_millis() as u64,
            last_result: CleanupCountStats {
                spans_deleted: result.counts.spans,
                span_events_deleted: result.counts.span_events,
                span_links_deleted: result.counts.span_links,
                logs_deleted: result.counts.logs,
                metrics_deleted: result.counts.metrics,
            },
        }
    }
}

pub async fn stats(State(state): State<AppState>) -> Response {
    let snapshot = match state.store.stats().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "stats query failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    let response = StatsResponse {
        database: DatabaseStats {
            path: snapshot.db_path,
            size_bytes: snapshot.db_size_bytes,
            wal_size_bytes: snapshot.wal_size_bytes,
        },
        tables: TableStats {
            spans: snapshot.tables.spans,
            span_events: snapshot.tables.span_events,
            span_links: snapshot.tables.span_links,
            logs: snapshot.tables.logs,
            metrics: snapshot.tables.metrics,
        },
        retention: RetentionStats {
            enabled: state.retention.enabled(),
            hours: state.retention.retention_hours,
            cleanup_interval_mins: state.retention.cleanup_interval_mins,
        },
        cleanup: snapshot.last_cleanup.as_ref().map(CleanupStats::from),
    };

    Json(response).into_response()
}

//! Retention cleanup worker
//!
//! A periodic single-flight loop deletes rows older than the cutoff from
//! every telemetry table inside one transaction, then checkpoints the WAL.
//! The last run's result is kept for the stats endpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use duckdb::{params, Connection};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::StoreError;
use super::sql_types::SqlTimestamp;
use super::{in_transaction, TelemetryStore};
use crate::core::config::RetentionConfig;

/// Rows deleted per table during one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub spans: u64,
    pub span_events: u64,
    pub span_links: u64,
    pub logs: u64,
    pub metrics: u64,
}

impl CleanupCounts {
    pub fn total(&self) -> u64 {
        self.spans + self.span_events + self.span_links + self.logs + self.metrics
    }
}

/// Outcome of the most recent cleanup cycle
#[derive(Debug, Clone)]
pub struct CleanupResult {
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub counts: CleanupCounts,
}

impl TelemetryStore {
    /// Start the periodic cleanup worker. Returns None when retention is
    /// disabled. The first cycle runs before the ticker starts; the task
    /// exits when the shutdown signal fires.
    pub fn start_retention_task(
        self: &Arc<Self>,
        config: RetentionConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Option<JoinHandle<()>> {
        if !config.enabled() {
            tracing::info!("retention disabled, cleanup worker not started");
            return None;
        }

        let interval_mins = config.cleanup_interval_mins.max(1);
        tracing::info!(
            retention_hours = config.retention_hours,
            interval_mins,
            "cleanup worker started"
        );

        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            store.run_cleanup(config.retention_hours).await;

            let mut interval = tokio::time::interval(Duration::from_secs(interval_mins * 60));
            // The first tick completes immediately; the startup cycle covered it
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("cleanup worker stopped");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        store.run_cleanup(config.retention_hours).await;
                    }
                }
            }
        }))
    }

    /// Execute one cleanup cycle. Single-flight: a concurrent cycle holding
    /// the gate causes this call to return immediately.
    pub async fn run_cleanup(self: &Arc<Self>, retention_hours: u64) {
        let Ok(_permit) = self.cleanup_gate().try_acquire() else {
            tracing::warn!("cleanup already in progress, skipping");
            return;
        };

        let start = Utc::now();
        let cutoff = start - TimeDelta::hours(retention_hours.min(i64::MAX as u64) as i64);

        let store = Arc::clone(self);
        let outcome = tokio::task::spawn_blocking(move || {
            let conn = store.conn();
            let counts = run_cleanup_cycle(&conn, cutoff)?;

            // Checkpoint failure is logged, not fatal; the deletes committed
            if let Err(e) = conn.execute("CHECKPOINT", []) {
                tracing::warn!(error = %e, "cleanup checkpoint failed");
            }
            Ok::<_, StoreError>(counts)
        })
        .await;

        match outcome {
            Ok(Ok(counts)) => {
                let duration = (Utc::now() - start).to_std().unwrap_or_default();
                if counts.total() > 0 {
                    tracing::info!(
                        duration_ms = duration.as_millis() as u64,
                        spans = counts.spans,
                        events = counts.span_events,
                        links = counts.span_links,
                        logs = counts.logs,
                        metrics = counts.metrics,
                        "cleanup completed"
                    );
                } else {
                    tracing::debug!(
                        duration_ms = duration.as_millis() as u64,
                        "cleanup completed, no old data to delete"
                    );
                }
                self.record_cleanup(CleanupResult {
                    timestamp: start,
                    duration,
                    counts,
                });
            }
            Ok(Err(e)) => tracing::error!(error = %e, "cleanup cycle failed"),
            Err(e) => tracing::error!(error = %e, "cleanup task failed"),
        }
    }
}

/// Delete expired rows from all telemetry tables in one transaction.
/// Children first so a mid-cycle failure never strands orphaned rows.
fn run_cleanup_cycle(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> Result<CleanupCounts, StoreError> {
    in_transaction(conn, |conn| {
        let mut counts = CleanupCounts::default();
        counts.span_events = delete_before(conn, "span_events", cutoff)?;
        counts.span_links = delete_before(conn, "span_links", cutoff)?;
        counts.spans = delete_before(conn, "spans", cutoff)?;
        counts.logs = delete_before(conn, "logs", cutoff)?;
        counts.metrics = delete_before(conn, "metrics", cutoff)?;
        Ok(counts)
    })
}

fn delete_before(
    conn: &Connection,
    table: &str,
    cutoff: DateTime<Utc>,
) -> Result<u64, StoreError> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE ingested_at < ?"),
        params![SqlTimestamp(cutoff)],
    )
    .map(|n| n as u64)
    .map_err(|e| StoreError::infrastructure("cleanup delete failed", e))
}

//! DuckDB-backed telemetry store
//!
//! A single shared connection sits behind a mutex; every engine call runs
//! on the tokio blocking pool. Ingest paths write through the bulk Appender
//! API, one appender per target table, flushed atomically per request.

pub mod error;
pub mod flatten;
mod logs;
mod metrics;
pub mod retention;
pub mod schema;
pub mod sql_types;
mod traces;

pub use error::{StoreError, StoreResult};
pub use retention::{CleanupCounts, CleanupResult};

use std::sync::Arc;

use duckdb::Connection;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::Semaphore;

use schema::SCHEMA_SQL;

/// Per-table row counts for the stats endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct TableCounts {
    pub spans: i64,
    pub span_events: i64,
    pub span_links: i64,
    pub logs: i64,
    pub metrics: i64,
}

/// Snapshot of engine metadata served by `/stats`
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub db_path: String,
    pub db_size_bytes: u64,
    pub wal_size_bytes: u64,
    pub tables: TableCounts,
    pub last_cleanup: Option<CleanupResult>,
}

pub struct TelemetryStore {
    conn: Mutex<Option<Connection>>,
    db_path: String,
    last_cleanup: RwLock<Option<CleanupResult>>,
    /// Single-flight guard for retention cycles
    cleanup_gate: Semaphore,
}

impl TelemetryStore {
    /// Open the store at `path`; an empty path selects an in-memory engine.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let (conn, db_path) = if path.is_empty() {
            let conn = Connection::open_in_memory()
                .map_err(|e| StoreError::infrastructure("failed to open in-memory duckdb", e))?;
            (conn, ":memory:".to_string())
        } else {
            let conn = Connection::open(path)
                .map_err(|e| StoreError::infrastructure("failed to open duckdb", e))?;
            (conn, path.to_string())
        };

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::infrastructure("failed to initialize schema", e))?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path,
            last_cleanup: RwLock::new(None),
            cleanup_gate: Semaphore::new(1),
        })
    }

    /// Exclusive access to the connection for the duration of the guard.
    ///
    /// # Panics
    /// Panics if the connection was already closed via `close()`.
    pub(crate) fn conn(&self) -> parking_lot::MappedMutexGuard<'_, Connection> {
        MutexGuard::map(self.conn.lock(), |opt| {
            opt.as_mut().expect("duckdb connection already closed")
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }

    pub(crate) fn cleanup_gate(&self) -> &Semaphore {
        &self.cleanup_gate
    }

    pub(crate) fn record_cleanup(&self, result: CleanupResult) {
        *self.last_cleanup.write() = Some(result);
    }

    pub fn last_cleanup(&self) -> Option<CleanupResult> {
        self.last_cleanup.read().clone()
    }

    /// Store an OTLP trace export; one connection, three appenders,
    /// flushed together at the end of the request.
    pub async fn store_traces(
        self: &Arc<Self>,
        req: ExportTraceServiceRequest,
    ) -> Result<StoreResult, StoreError> {
        self.run_blocking(move |conn| traces::append_traces(conn, &req))
            .await
    }

    pub async fn store_logs(
        self: &Arc<Self>,
        req: ExportLogsServiceRequest,
    ) -> Result<StoreResult, StoreError> {
        self.run_blocking(move |conn| logs::append_logs(conn, &req))
            .await
    }

    pub async fn store_metrics(
        self: &Arc<Self>,
        req: ExportMetricsServiceRequest,
    ) -> Result<StoreResult, StoreError> {
        self.run_blocking(move |conn| metrics::append_metrics(conn, &req))
            .await
    }

    /// Ping the engine
    pub async fn health(self: &Arc<Self>) -> Result<(), StoreError> {
        self.run_blocking(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                .map_err(|e| StoreError::infrastructure("health ping failed", e))?;
            Ok(())
        })
        .await
    }

    /// Table counts, file sizes, and the last retention run
    pub async fn stats(self: &Arc<Self>) -> Result<StorageStats, StoreError> {
        let store = Arc::clone(self);
        self.run_blocking(move |conn| {
            let tables = TableCounts {
                spans: count_rows(conn, "spans")?,
                span_events: count_rows(conn, "span_events")?,
                span_links: count_rows(conn, "span_links")?,
                logs: count_rows(conn, "logs")?,
                metrics: count_rows(conn, "metrics")?,
            };

            let (db_size_bytes, wal_size_bytes) = if store.is_in_memory() {
                (0, 0)
            } else {
                (
                    file_size(&store.db_path),
                    file_size(&format!("{}.wal", store.db_path)),
                )
            };

            Ok(StorageStats {
                db_path: store.db_path.clone(),
                db_size_bytes,
                wal_size_bytes,
                tables,
                last_cleanup: store.last_cleanup(),
            })
        })
        .await
    }

    /// Flush the write-ahead log into the main database file
    pub async fn checkpoint(self: &Arc<Self>) -> Result<(), StoreError> {
        self.run_blocking(|conn| {
            conn.execute("CHECKPOINT", [])
                .map_err(|e| StoreError::infrastructure("checkpoint failed", e))?;
            Ok(())
        })
        .await
    }

    /// Checkpoint and close the connection; later calls to `conn()` panic.
    pub async fn close(self: &Arc<Self>) -> Result<(), StoreError> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut guard = store.conn.lock();
            if let Some(conn) = guard.take() {
                if let Err(e) = conn.execute("CHECKPOINT", []) {
                    tracing::warn!(error = %e, "checkpoint failed during close");
                }
                conn.close()
                    .map_err(|(_, e)| StoreError::infrastructure("failed to close duckdb", e))?;
                tracing::debug!("duckdb connection closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    /// Run `f` on the blocking pool holding the connection lock.
    pub(crate) async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let conn = store.conn();
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

/// Execute `f` inside a transaction, rolling back on error.
pub(crate) fn in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    conn.execute_batch("BEGIN TRANSACTION")
        .map_err(|e| StoreError::infrastructure("failed to begin transaction", e))?;
    match f(conn) {
        Ok(val) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| StoreError::infrastructure("failed to commit transaction", e))?;
            Ok(val)
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %rollback_err, "rollback failed after transaction error");
            }
            Err(e)
        }
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, StoreError> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .map_err(|e| StoreError::infrastructure("count query failed", e))
}

fn file_size(path: &str) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

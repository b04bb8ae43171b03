//! HTTP surface: routing, middleware, handlers

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod server;

use std::sync::Arc;

use crate::core::config::RetentionConfig;
use crate::data::duckdb::TelemetryStore;
use crate::data::sqlite::AuthStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    /// Absent when auth is disabled
    pub auth: Option<Arc<AuthStore>>,
    pub retention: RetentionConfig,
}

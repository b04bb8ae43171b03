//! Router assembly and HTTP server
//!
//! Middleware composes outermost-first as: request id → panic recovery →
//! request timeout → size limit → gzip → (auth → scope) → concurrency gate
//! → handler. Admin key routes exist only when auth is enabled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use std::convert::Infallible;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use super::auth::{require_auth, require_scope, AuthState};
use super::middleware;
use super::routes::admin_keys::{self, AdminState};
use super::routes::{health, otlp, query, stats};
use super::AppState;
use crate::core::config::Config;
use crate::core::constants::{
    MAX_REQUEST_SIZE, SERVER_REQUEST_TIMEOUT_SECS, SHUTDOWN_DRAIN_TIMEOUT_SECS,
};
use crate::core::shutdown::Shutdown;
use crate::data::sqlite::Scope;

pub fn build_router(config: &Config, state: AppState) -> Router {
    let ingest_sem = Arc::new(Semaphore::new(config.max_concurrent_ingest));
    let query_sem = Arc::new(Semaphore::new(config.max_concurrent_query));

    let mut ingest_routes = Router::new()
        .route("/v1/traces", post(otlp::traces::export))
        .route("/v1/metrics", post(otlp::metrics::export))
        .route("/v1/logs", post(otlp::logs::export))
        .with_state(state.clone())
        .layer(from_fn_with_state(ingest_sem, middleware::limit_concurrency));

    let mut query_routes = Router::new()
        .route("/query", post(query::query))
        .with_state(state.clone())
        .layer(from_fn_with_state(query_sem, middleware::limit_concurrency));

    let mut stats_routes = Router::new()
        .route("/stats", get(stats::stats))
        .with_state(state.clone());

    let mut admin_routes = None;

    if let Some(auth) = &state.auth {
        let auth_state = AuthState { auth: auth.clone() };

        ingest_routes = ingest_routes
            .layer(from_fn_with_state(Scope::INGEST, require_scope))
            .layer(from_fn_with_state(auth_state.clone(), require_auth));
        query_routes = query_routes
            .layer(from_fn_with_state(Scope::READ, require_scope))
            .layer(from_fn_with_state(auth_state.clone(), require_auth));
        stats_routes = stats_routes
            .layer(from_fn_with_state(Scope::READ, require_scope))
            .layer(from_fn_with_state(auth_state.clone(), require_auth));

        admin_routes = Some(
            Router::new()
                .route(
                    "/admin/keys",
                    get(admin_keys::list_keys).post(admin_keys::create_key),
                )
                .route("/admin/keys/{id}", delete(admin_keys::revoke_key))
                .with_state(AdminState { auth: auth.clone() })
                .layer(from_fn_with_state(Scope::ADMIN, require_scope))
                .layer(from_fn_with_state(auth_state, require_auth)),
        );
    }

    let mut router = Router::new()
        .route("/health", get(health::health))
        .with_state(state)
        .merge(ingest_routes)
        .merge(query_routes)
        .merge(stats_routes);
    if let Some(admin) = admin_routes {
        router = router.merge(admin);
    }

    // Layer order is inverted at build time: the last layer added runs
    // first on the request path.
    router
        .layer(from_fn(middleware::decompress_gzip))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
        .layer(
            // Router::layer needs an infallible service, so the timeout
            // error is mapped to 408 here.
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    SERVER_REQUEST_TIMEOUT_SECS,
                ))),
        )
        .layer(from_fn(middleware::recovery))
        .layer(from_fn(middleware::request_id))
}

async fn handle_timeout(_: Infallible) -> StatusCode {
    StatusCode::REQUEST_TIMEOUT
}

/// Serve until shutdown triggers, then drain in-flight requests with a
/// bounded grace period.
pub async fn run(config: &Config, state: AppState, shutdown: Shutdown) -> Result<()> {
    let router = build_router(config, state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    let wait = shutdown.wait();
    let mut server =
        tokio::spawn(async move { axum::serve(listener, router).with_graceful_shutdown(wait).await });

    tokio::select! {
        result = &mut server => result??,
        _ = shutdown.wait() => {
            let drain = Duration::from_secs(SHUTDOWN_DRAIN_TIMEOUT_SECS);
            match tokio::time::timeout(drain, &mut server).await {
                Ok(result) => result??,
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = drain.as_secs(),
                        "drain timeout exceeded, aborting open connections"
                    );
                    server.abort();
                }
            }
        }
    }
    Ok(())
}

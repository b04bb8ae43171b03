//! Health check endpoint (`GET /health`, always public)

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::api::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let response = match state.store.health().await {
        Ok(()) => HealthResponse {
            status: "healthy",
            database: "connected",
            message: Some("mo11y is running".to_string()),
        },
        Err(e) => HealthResponse {
            status: "unhealthy",
            database: "disconnected",
            message: Some(e.to_string()),
        },
    };
    Json(response).into_response()
}

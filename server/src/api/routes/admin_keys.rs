//! Admin key lifecycle endpoints (`/admin/keys`, admin scope)
//!
//! Listing never returns hashes or key material; creation returns the full
//! key string exactly once; deletion revokes rather than removing the row.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::auth::error_response;
use crate::data::sqlite::{AuthError, AuthStore, KeyInfo, Scope};

#[derive(Clone)]
pub struct AdminState {
    pub auth: Arc<AuthStore>,
}

#[derive(Deserialize)]
struct CreateKeyRequest {
    #[serde(default)]
    name: String,
    /// Comma-separated subset of {ingest, read, admin}
    #[serde(default)]
    scopes: String,
}

#[derive(Serialize)]
struct KeyResponse {
    id: String,
    name: String,
    prefix: String,
    scopes: String,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<String>,
    revoked: bool,
}

impl From<KeyInfo> for KeyResponse {
    fn from(info: KeyInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            prefix: info.prefix,
            scopes: info.scopes.to_string(),
            created_at: info.created_at.to_rfc3339(),
            expires_at: info.expires_at.map(|t| t.to_rfc3339()),
            last_used_at: info.last_used_at.map(|t| t.to_rfc3339()),
            revoked: info.revoked,
        }
    }
}

pub async fn list_keys(State(state): State<AdminState>) -> Response {
    match state.auth.list_keys().await {
        Ok(keys) => {
            let response: Vec<KeyResponse> = keys.into_iter().map(KeyResponse::from).collect();
            Json(response).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

pub async fn create_key(
    State(state): State<AdminState>,
    creator: Option<Extension<KeyInfo>>,
    body: Bytes,
) -> Response {
    let Ok(req) = serde_json::from_slice::<CreateKeyRequest>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid request body");
    };

    if req.name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "name is required");
    }

    let scopes = Scope::parse(&req.scopes);
    if scopes.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "at least one scope required (ingest, read, admin)",
        );
    }

    let created_by = creator
        .map(|Extension(info)| info.id)
        .unwrap_or_default();

    match state.auth.create_key(&req.name, scopes, None, &created_by).await {
        Ok((key, info)) => (
            StatusCode::CREATED,
            Json(json!({
                "id": info.id,
                "name": info.name,
                // The only time the full key is returned
                "key": key,
                "scopes": info.scopes.to_string(),
            })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

pub async fn revoke_key(State(state): State<AdminState>, Path(id): Path<String>) -> Response {
    match state.auth.revoke_key(&id).await {
        Ok(()) => Json(json!({ "status": "revoked" })).into_response(),
        Err(AuthError::KeyNotFound) => error_response(StatusCode::NOT_FOUND, "key not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

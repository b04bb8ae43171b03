//! API key authentication and scope middleware
//!
//! Keys arrive as `Authorization: Bearer …` or `X-API-Key`. Validation
//! failures answer 401 with distinguishable messages; a valid key that
//! lacks the required scope answers 403.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::middleware::request_id_of;
use crate::core::constants::API_KEY_PREFIX;
use crate::data::sqlite::{AuthError, AuthStore, KeyInfo, Scope};

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthStore>,
}

/// JSON error body shared by auth and admin responses
pub fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

/// Validate the request's API key and stash its metadata in extensions
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_key(req.headers()) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing authorization");
    };

    if !key.starts_with(API_KEY_PREFIX) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid key format");
    }

    match state.auth.validate_key(&key).await {
        Ok(info) => {
            req.extensions_mut().insert(info);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id_of(&req), error = %e, "auth failed");
            match e {
                AuthError::KeyRevoked => error_response(StatusCode::UNAUTHORIZED, "key revoked"),
                AuthError::KeyExpired => error_response(StatusCode::UNAUTHORIZED, "key expired"),
                _ => error_response(StatusCode::UNAUTHORIZED, "invalid key"),
            }
        }
    }
}

/// Reject the request unless the validated key carries the required scope
pub async fn require_scope(State(required): State<Scope>, req: Request, next: Next) -> Response {
    match req.extensions().get::<KeyInfo>() {
        None => error_response(StatusCode::UNAUTHORIZED, "missing authorization"),
        Some(info) if !info.scopes.has(required) => {
            error_response(StatusCode::FORBIDDEN, "insufficient permissions")
        }
        Some(_) => next.run(req).await,
    }
}

fn extract_key(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(key) = auth.strip_prefix("Bearer ") {
            return Some(key.to_string());
        }
    }

    headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(|k| k.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    const PEPPER: &str = "0123456789abcdef0123456789abcdef";

    async fn protected_app(required: Scope) -> (Arc<AuthStore>, Router) {
        let auth = Arc::new(AuthStore::open(":memory:", PEPPER).await.unwrap());
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(required, require_scope))
            .layer(from_fn_with_state(AuthState { auth: auth.clone() }, require_auth));
        (auth, app)
    }

    async fn error_field(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["error"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_extract_key_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer mo11y_abc".parse().unwrap());
        assert_eq!(extract_key(&headers), Some("mo11y_abc".to_string()));
    }

    #[test]
    fn test_extract_key_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", "mo11y_def".parse().unwrap());
        assert_eq!(extract_key(&headers), Some("mo11y_def".to_string()));
    }

    #[test]
    fn test_extract_key_bearer_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer mo11y_abc".parse().unwrap());
        headers.insert("X-API-Key", "mo11y_def".parse().unwrap());
        assert_eq!(extract_key(&headers), Some("mo11y_abc".to_string()));
    }

    #[test]
    fn test_extract_key_missing() {
        assert_eq!(extract_key(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_missing_authorization() {
        let (_auth, app) = protected_app(Scope::READ).await;
        let response = app
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_field(response).await, "missing authorization");
    }

    #[tokio::test]
    async fn test_wrong_prefix_rejected() {
        let (_auth, app) = protected_app(Scope::READ).await;
        let response = app
            .oneshot(
                HttpRequest::get("/")
                    .header(header::AUTHORIZATION, "Bearer other_key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_field(response).await, "invalid key format");
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let (_auth, app) = protected_app(Scope::READ).await;
        let response = app
            .oneshot(
                HttpRequest::get("/")
                    .header("X-API-Key", "mo11y_00000000000000000000000000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_field(response).await, "invalid key");
    }

    #[tokio::test]
    async fn test_revoked_key_message() {
        let (auth, app) = protected_app(Scope::READ).await;
        let (key, info) = auth.create_key("k", Scope::READ, None, "").await.unwrap();
        auth.revoke_key(&info.id).await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::get("/")
                    .header(header::AUTHORIZATION, format!("Bearer {key}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_field(response).await, "key revoked");
    }

    #[tokio::test]
    async fn test_valid_key_with_scope_passes() {
        let (auth, app) = protected_app(Scope::READ).await;
        let (key, _) = auth.create_key("k", Scope::READ, None, "").await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::get("/")
                    .header(header::AUTHORIZATION, format!("Bearer {key}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_insufficient_scope_forbidden() {
        let (auth, app) = protected_app(Scope::READ).await;
        let (key, _) = auth.create_key("k", Scope::INGEST, None, "").await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::get("/")
                    .header(header::AUTHORIZATION, format!("Bearer {key}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_field(response).await, "insufficient permissions");
    }

    #[tokio::test]
    async fn test_admin_key_grants_all_scopes() {
        let (auth, app) = protected_app(Scope::READ).await;
        let (key, _) = auth.create_key("k", Scope::ADMIN, None, "").await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::get("/")
                    .header(header::AUTHORIZATION, format!("Bearer {key}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

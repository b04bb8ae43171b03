//! Request admission middleware
//!
//! Order on the request path: request id → panic recovery → size limit →
//! gzip decompression → (auth → scope) → concurrency gate → handler.

use std::io::Read;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use futures::FutureExt;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::core::constants::MAX_REQUEST_SIZE;

/// Per-request correlation id, generated at the outermost middleware and
/// read by handlers for log tagging.
#[derive(Debug, Clone)]
pub struct RequestId(pub Arc<str>);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default()
}

/// Assign a UUID to each request and stash it in extensions
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id: Arc<str> = Uuid::new_v4().to_string().into();
    req.extensions_mut().insert(RequestId(id));
    next.run(req).await
}

/// Catch panics from downstream code, log them with the request id, 503
pub async fn recovery(req: Request, next: Next) -> Response {
    let request_id = request_id_of(&req);
    match std::panic::AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                request_id = %request_id,
                panic = %panic_message(&panic),
                "panic recovered"
            );
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Decompress gzip request bodies. Unknown encodings get 415, malformed
/// gzip gets 400, and the header is stripped on success. The 10 MiB cap
/// applies to the wire (compressed) bytes here.
pub async fn decompress_gzip(req: Request, next: Next) -> Response {
    let encoding = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if encoding.is_empty() {
        return next.run(req).await;
    }

    let request_id = request_id_of(&req);

    if !encoding.eq_ignore_ascii_case("gzip") {
        tracing::warn!(request_id = %request_id, encoding = %encoding, "unsupported content encoding");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let (mut parts, body) = req.into_parts();
    let compressed = match to_bytes(body, MAX_REQUEST_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let mut decompressed = Vec::new();
    if let Err(e) = GzDecoder::new(compressed.as_ref()).read_to_end(&mut decompressed) {
        tracing::warn!(request_id = %request_id, error = %e, "gzip decompression failed");
        return StatusCode::BAD_REQUEST.into_response();
    }

    parts.headers.remove(header::CONTENT_ENCODING);
    next.run(Request::from_parts(parts, Body::from(decompressed)))
        .await
}

/// Bounded concurrency gate; saturation is the backpressure signal.
/// Acquisition is non-blocking and the permit is held for the handler.
pub async fn limit_concurrency(
    State(semaphore): State<Arc<Semaphore>>,
    req: Request,
    next: Next,
) -> Response {
    match Arc::clone(&semaphore).try_acquire_owned() {
        Ok(_permit) => next.run(req).await,
        Err(_) => {
            tracing::warn!(
                request_id = %request_id_of(&req),
                "concurrency limit reached, rejecting request"
            );
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::Extension;
    use axum::http::Request as HttpRequest;
    use axum::middleware::{from_fn, from_fn_with_state};
    use axum::routing::{get, post};
    use axum::Router;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_request_id_is_set() {
        async fn echo_id(Extension(id): Extension<RequestId>) -> String {
            id.as_str().to_string()
        }

        let app = Router::new()
            .route("/", get(echo_id))
            .layer(from_fn(request_id));

        let response = app
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let id = body_string(response).await;
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn test_recovery_returns_503_on_panic() {
        async fn boom() -> &'static str {
            panic!("kaboom");
        }

        let app = Router::new()
            .route("/", get(boom))
            .layer(from_fn(recovery))
            .layer(from_fn(request_id));

        let response = app
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    fn echo_app() -> Router {
        async fn echo(body: Bytes) -> Vec<u8> {
            body.to_vec()
        }
        Router::new()
            .route("/", post(echo))
            .layer(from_fn(decompress_gzip))
    }

    #[tokio::test]
    async fn test_gzip_passthrough_without_header() {
        let response = echo_app()
            .oneshot(HttpRequest::post("/").body(Body::from("plain")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "plain");
    }

    #[tokio::test]
    async fn test_gzip_decompresses_and_strips_header() {
        async fn check(req: Request) -> Response {
            assert!(req.headers().get(header::CONTENT_ENCODING).is_none());
            let bytes = to_bytes(req.into_body(), usize::MAX).await.unwrap();
            String::from_utf8(bytes.to_vec()).unwrap().into_response()
        }
        let app = Router::new()
            .route("/", post(check))
            .layer(from_fn(decompress_gzip));

        let response = app
            .oneshot(
                HttpRequest::post("/")
                    .header(header::CONTENT_ENCODING, "gzip")
                    .body(Body::from(gzip(b"hello gzip")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "hello gzip");
    }

    #[tokio::test]
    async fn test_gzip_header_is_case_insensitive() {
        let response = echo_app()
            .oneshot(
                HttpRequest::post("/")
                    .header(header::CONTENT_ENCODING, "GZIP")
                    .body(Body::from(gzip(b"upper")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "upper");
    }

    #[tokio::test]
    async fn test_unknown_encoding_rejected_415() {
        let response = echo_app()
            .oneshot(
                HttpRequest::post("/")
                    .header(header::CONTENT_ENCODING, "zstd")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_malformed_gzip_rejected_400() {
        let response = echo_app()
            .oneshot(
                HttpRequest::post("/")
                    .header(header::CONTENT_ENCODING, "gzip")
                    .body(Body::from("definitely not gzip"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_semaphore_saturation_returns_503() {
        async fn slow() -> &'static str {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "done"
        }

        let semaphore = Arc::new(Semaphore::new(1));
        let app = Router::new()
            .route("/", get(slow))
            .layer(from_fn_with_state(semaphore, limit_concurrency));

        let first = app.clone();
        let second = app;
        let (a, b) = tokio::join!(
            first.oneshot(HttpRequest::get("/").body(Body::empty()).unwrap()),
            async {
                // Give the first request time to take the permit
                tokio::time::sleep(Duration::from_millis(50)).await;
                second
                    .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
                    .await
            }
        );

        let statuses = [a.unwrap().status(), b.unwrap().status()];
        assert!(statuses.contains(&StatusCode::OK));
        assert!(statuses.contains(&StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_semaphore_released_after_request() {
        let semaphore = Arc::new(Semaphore::new(1));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(semaphore, limit_concurrency));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}

//! OTLP/HTTP ingest endpoints
//!
//! POST-only, protobuf-only. Per-item rejections come back inside the
//! OTLP partial-success field at HTTP 200; infrastructure failures are 503.

pub mod logs;
pub mod metrics;
pub mod traces;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use prost::Message;

use crate::api::middleware::RequestId;
use crate::core::constants::{MAX_REQUEST_SIZE, PROTOBUF_CONTENT_TYPE};
use crate::data::duckdb::StoreError;

fn is_protobuf(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with(PROTOBUF_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Enforce content type, read the body under the size cap, decode protobuf.
/// Returns the finished error response on failure.
async fn read_request<T: Message + Default>(
    request_id: &RequestId,
    signal: &'static str,
    headers: &HeaderMap,
    body: Body,
) -> Result<T, Response> {
    if !is_protobuf(headers) {
        tracing::warn!(
            request_id = %request_id.as_str(),
            signal,
            "unsupported content type"
        );
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response());
    }

    let bytes = to_bytes(body, MAX_REQUEST_SIZE).await.map_err(|e| {
        tracing::warn!(request_id = %request_id.as_str(), signal, error = %e, "failed to read body");
        StatusCode::BAD_REQUEST.into_response()
    })?;

    T::decode(bytes.as_ref()).map_err(|e| {
        tracing::warn!(request_id = %request_id.as_str(), signal, error = %e, "failed to decode protobuf");
        StatusCode::BAD_REQUEST.into_response()
    })
}

fn protobuf_response<T: Message>(response: &T) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        response.encode_to_vec(),
    )
        .into_response()
}

fn store_error_response(request_id: &RequestId, signal: &'static str, e: StoreError) -> Response {
    tracing::error!(
        request_id = %request_id.as_str(),
        signal,
        error = %e,
        "storage unavailable"
    );
    StatusCode::SERVICE_UNAVAILABLE.into_response()
}

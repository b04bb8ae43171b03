//! Trace export endpoint (`POST /v1/traces`)

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTracePartialSuccess, ExportTraceServiceRequest, ExportTraceServiceResponse,
};

use super::{protobuf_response, read_request, store_error_response};
use crate::api::middleware::RequestId;
use crate::api::AppState;

pub async fn export(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let req: ExportTraceServiceRequest =
        match read_request(&request_id, "traces", &headers, body).await {
            Ok(req) => req,
            Err(response) => return response,
        };

    match state.store.store_traces(req).await {
        Ok(result) => {
            tracing::debug!(
                request_id = %request_id.as_str(),
                accepted = result.accepted,
                rejected = result.rejected,
                "stored trace export"
            );
            let partial_success = result.has_rejections().then(|| ExportTracePartialSuccess {
                rejected_spans: result.rejected as i64,
                error_message: result.error_message(),
            });
            protobuf_response(&ExportTraceServiceResponse { partial_success })
        }
        Err(e) => store_error_response(&request_id, "traces", e),
    }
}

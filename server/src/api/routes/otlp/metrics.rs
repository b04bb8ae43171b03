//! Metric export endpoint (`POST /v1/metrics`)

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsPartialSuccess, ExportMetricsServiceRequest, ExportMetricsServiceResponse,
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
    let req: ExportMetricsServiceRequest =
        match read_request(&request_id, "metrics", &headers, body).await {
            Ok(req) => req,
            Err(response) => return response,
        };

    match state.store.store_metrics(req).await {
        Ok(result) => {
            tracing::debug!(
                request_id = %request_id.as_str(),
                accepted = result.accepted,
                rejected = result.rejected,
                "stored metric export"
            );
            let partial_success = result.has_rejections().then(|| ExportMetricsPartialSuccess {
                rejected_data_points: result.rejected as i64,
                error_message: result.error_message(),
            });
            protobuf_response(&ExportMetricsServiceResponse { partial_success })
        }
        Err(e) => store_error_response(&request_id, "metrics", e),
    }
}

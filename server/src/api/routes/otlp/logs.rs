//! Log export endpoint (`POST /v1/logs`)

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;
use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsPartialSuccess, ExportLogsServiceRequest, ExportLogsServiceResponse,
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
    let req: ExportLogsServiceRequest =
        match read_request(&request_id, "logs", &headers, body).await {
            Ok(req) => req,
            Err(response) => return response,
        };

    match state.store.store_logs(req).await {
        Ok(result) => {
            tracing::debug!(
                request_id = %request_id.as_str(),
                accepted = result.accepted,
                rejected = result.rejected,
                "stored log export"
            );
            let partial_success = result.has_rejections().then(|| ExportLogsPartialSuccess {
                rejected_log_records: result.rejected as i64,
                error_message: result.error_message(),
            });
            protobuf_response(&ExportLogsServiceResponse { partial_success })
        }
        Err(e) => store_error_response(&request_id, "logs", e),
    }
}

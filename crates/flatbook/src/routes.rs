use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flatbook_core::{ErrorKind, IngestError, IngestReceipt};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(ingest))
        .route("/webhook", post(ingest))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestReceipt>, ApiError> {
    state.service.ingest(&body).await.map(Json).map_err(ApiError)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug)]
pub struct ApiError(pub IngestError);

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    kind: ErrorKind,
    error: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Storage => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!(kind = kind.as_str(), stage = %self.0.stage(), "ingest failed: {}", self.0);
        } else {
            warn!(kind = kind.as_str(), "ingest rejected: {}", self.0);
        }

        let body = ErrorBody {
            status: "error",
            kind,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

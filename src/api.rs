use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::entity::Entity;
use crate::error::SyncError;
use crate::sync::{SyncService, SyncSummary, TableStatus};
use crate::window::SyncRequest;

#[derive(Clone)]
pub struct AppState {
    pub service: SyncService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sync/{entity}", post(run_sync))
        .route("/sync/{entity}/status", get(table_status))
        .with_state(state)
}

/// Request-level failures that never reach the job.
#[derive(Debug)]
enum ApiError {
    UnknownEntity(String),
    BadBody(String),
    Sync(SyncError),
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError::Sync(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Sync(e) => return e.into_response(),
            ApiError::UnknownEntity(msg) => (StatusCode::NOT_FOUND, "unknown_entity", msg),
            ApiError::BadBody(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };
        let body = json!({ "error": { "type": kind, "message": message } });
        (status, Json(body)).into_response()
    }
}

fn entity_of(raw: &str) -> Result<Entity, ApiError> {
    raw.parse().map_err(ApiError::UnknownEntity)
}

/// An empty body is the incremental request `{}`.
fn request_of(body: &[u8]) -> Result<SyncRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SyncRequest::incremental());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadBody(format!("invalid JSON body: {e}")))
}

async fn run_sync(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    body: Bytes,
) -> Result<Json<SyncSummary>, ApiError> {
    let entity = entity_of(&entity)?;
    let req = request_of(&body)?;
    tracing::info!(
        target: "api",
        entity = %entity,
        start = ?req.start,
        end = ?req.end,
        "sync requested"
    );
    let summary = state.service.run(entity, &req).await?;
    Ok(Json(summary))
}

async fn table_status(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<TableStatus>, ApiError> {
    let entity = entity_of(&entity)?;
    Ok(Json(state.service.status(entity).await?))
}

// src/error.rs
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures talking to the source API. Any of these aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to source API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("source API answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("next-page cursor points outside the shop origin: {0}")]
    ForeignCursor(String),
}

/// Everything a sync run can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error(
        "table {table} has no rows yet; pass explicit start/end or set SYNC_BOOTSTRAP_START"
    )]
    EmptyTable { table: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("load into {table} failed: {reason}")]
    Load { table: String, reason: String },

    #[error("compaction of {table} failed: {reason}")]
    Compaction { table: String, reason: String },

    #[error("warehouse query failed: {0}")]
    Warehouse(String),

    #[error("sync exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("a sync for {0} is already running")]
    AlreadyRunning(String),
}

impl SyncError {
    /// Stable label used for the JSON error type and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidRange(_) => "invalid_range",
            SyncError::EmptyTable { .. } => "empty_table",
            SyncError::Fetch(_) => "fetch",
            SyncError::Load { .. } => "load",
            SyncError::Compaction { .. } => "compaction",
            SyncError::Warehouse(_) => "warehouse",
            SyncError::Timeout(_) => "timeout",
            SyncError::AlreadyRunning(_) => "already_running",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SyncError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            SyncError::EmptyTable { .. } => StatusCode::PRECONDITION_FAILED,
            SyncError::AlreadyRunning(_) => StatusCode::CONFLICT,
            SyncError::Fetch(_) => StatusCode::BAD_GATEWAY,
            SyncError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SyncError::Load { .. } | SyncError::Compaction { .. } | SyncError::Warehouse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Warehouse(e.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "sync failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "sync rejected");
        }

        let body = json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

// Handlers module
// HTTP handlers for the REST API

pub mod diagnostics;
pub mod wishes;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Root health check
/// GET /
/// Static payload, never touches storage.
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "message": "Birthday API running"
        })),
    )
}

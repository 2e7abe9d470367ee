// Diagnostics handler
// Reports document store connectivity without ever failing the request

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::StorageClient;

pub const BACKEND_NAME: &str = "axum";
pub const DATABASE_KIND: &str = "postgresql";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Ok,
    Unavailable,
    Error,
}

/// Body of `GET /test`. Optional fields are omitted when not relevant to the
/// reported status.
#[derive(Debug, Serialize)]
pub struct DiagnosticsReport {
    pub backend: &'static str,
    pub database: &'static str,
    pub connection_status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiagnosticsReport {
    fn new(connection_status: ConnectionStatus) -> Self {
        Self {
            backend: BACKEND_NAME,
            database: DATABASE_KIND,
            connection_status,
            database_url: None,
            database_name: None,
            collections: None,
            error: None,
        }
    }
}

/// Connectivity report
/// GET /test
pub async fn connection_test(State(storage): State<StorageClient>) -> impl IntoResponse {
    let report = build_report(&storage).await;
    (StatusCode::OK, Json(report))
}

pub async fn build_report(storage: &StorageClient) -> DiagnosticsReport {
    if let Some(reason) = storage.unavailable_reason() {
        let mut report = DiagnosticsReport::new(ConnectionStatus::Unavailable);
        report.error = Some(reason.to_string());
        return report;
    }

    match storage.list_collection_names().await {
        Ok(collections) => {
            info!("Connection test listed {} collections", collections.len());
            let mut report = DiagnosticsReport::new(ConnectionStatus::Ok);
            report.database_url = Some("configured");
            report.database_name = storage.database_name().map(str::to_string);
            report.collections = Some(collections);
            report
        }
        Err(e) => {
            warn!("Connection test failed: {}", e);
            let mut report = DiagnosticsReport::new(ConnectionStatus::Error);
            report.error = Some(e.to_string());
            report
        }
    }
}

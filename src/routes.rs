use axum::{routing::get, Router};
use std::time::Duration;

use crate::{
    handlers::{
        diagnostics::connection_test,
        root,
        wishes::{create_wish, list_wishes},
    },
    middleware::create_middleware_stack,
    store::StorageClient,
};

/// Create the Axum router with all endpoints and middleware
pub fn create_router(storage: StorageClient, request_timeout: Duration) -> Router {
    Router::new()
        // Health and diagnostics
        .route("/", get(root))
        .route("/test", get(connection_test))
        // Wish endpoints
        .route("/wishes", get(list_wishes).post(create_wish))
        .with_state(storage)
        .layer(create_middleware_stack(request_timeout))
}

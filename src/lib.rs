// Library root for the Birthday Wishes API

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;

// Re-export commonly used types
pub use error::ApiError;
pub use models::{CreateWishRequest, Wish};
pub use routes::create_router;
pub use store::{DocumentStore, StorageClient};

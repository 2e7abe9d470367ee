// Wish handlers
// HTTP handlers for listing and creating wishes

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::ApiError,
    models::wish::{CreateWishRequest, Wish, WISH_COLLECTION},
    store::{Document, SortSpec, StorageClient, CREATED_AT_FIELD},
};

pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Query parameters for listing wishes
#[derive(Debug, Deserialize)]
pub struct ListWishesQuery {
    pub limit: Option<i64>,
}

impl ListWishesQuery {
    /// `0` means no limit and negative values count by magnitude, as in
    /// document-store cursors.
    pub fn effective_limit(&self) -> Option<u64> {
        match self.limit.unwrap_or(DEFAULT_LIST_LIMIT) {
            0 => None,
            n => Some(n.unsigned_abs()),
        }
    }
}

/// List latest wishes, newest first
/// GET /wishes?limit=<n>
pub async fn list_wishes(
    State(storage): State<StorageClient>,
    params: Result<Query<ListWishesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;

    if !storage.is_available() {
        return Err(ApiError::StorageUnavailable);
    }

    let limit = params.effective_limit();
    info!("Fetching wishes (limit: {:?})", limit);

    let documents = storage
        .find_many(
            WISH_COLLECTION,
            &Document::new(),
            Some(&SortSpec::descending(CREATED_AT_FIELD)),
            limit,
        )
        .await?;

    let wishes: Vec<Wish> = documents.iter().map(Wish::from_document).collect();

    info!("Retrieved {} wishes", wishes.len());
    Ok((StatusCode::OK, Json(wishes)))
}

/// Create a wish
/// POST /wishes
pub async fn create_wish(
    State(storage): State<StorageClient>,
    request: Result<Json<CreateWishRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request?;

    if !storage.is_available() {
        return Err(ApiError::StorageUnavailable);
    }

    let new_wish = request.validate().map_err(ApiError::Validation)?;
    info!("Creating new wish from: {}", new_wish.name);

    let id = storage.insert(WISH_COLLECTION, &new_wish).await?;

    let wish = match storage.find_one(WISH_COLLECTION, &id).await? {
        Some(document) => Wish::from_document(&document),
        None => {
            warn!("Inserted wish {} could not be read back, responding with submitted fields", id);
            Wish::from_inserted(id, new_wish)
        }
    };

    info!("Successfully created wish with id: {}", wish.id);
    Ok((StatusCode::OK, Json(wish)))
}

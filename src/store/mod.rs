//! Document storage.
//!
//! Handlers talk to a [`StorageClient`], which either wraps a connected
//! [`DocumentStore`] backend or carries the reason storage is unavailable.
//! Backends: [`postgres::PostgresStore`] (JSONB documents) and
//! [`memory::InMemoryStore`].

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
pub use crate::config::NOT_CONFIGURED_REASON;
use crate::error::{ApiError, ApiResult};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// A stored document: a flat JSON object.
pub type Document = Map<String, Value>;

/// Key under which every document carries its identifier.
pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Single-field sort for [`DocumentStore::find_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Storage backend holding named collections of documents.
///
/// Missing or null sort fields order lowest: first when ascending, last when
/// descending.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists `document` in `collection` and returns the identifier the
    /// store assigned to it.
    async fn insert_document(&self, collection: &str, document: Document) -> ApiResult<String>;

    /// Fetches a document by identifier. The returned document includes [`ID_FIELD`].
    async fn find_one(&self, collection: &str, id: &str) -> ApiResult<Option<Document>>;

    /// Returns documents whose fields equal every entry of `filter`.
    /// `limit = None` returns all matches.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Document,
        sort: Option<&SortSpec>,
        limit: Option<u64>,
    ) -> ApiResult<Vec<Document>>;

    /// Names of the collections currently holding documents.
    async fn list_collection_names(&self) -> ApiResult<Vec<String>>;
}

/// Generates a 24 character hex identifier: 4 bytes of Unix seconds followed
/// by the low 8 bytes of a v4 UUID. Two of those bits are the UUID variant
/// marker, so the suffix carries 62 random bits and character 8 is always
/// one of `8`, `9`, `a`, `b`.
pub fn new_object_id() -> String {
    let seconds = Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
    let random = Uuid::new_v4().as_u128() as u64;
    format!("{:08x}{:016x}", seconds, random)
}

/// Storage timestamps are RFC 3339 UTC strings with microsecond precision so
/// that they also order correctly as plain strings.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
enum StorageState {
    Connected {
        store: Arc<dyn DocumentStore>,
        database_name: String,
    },
    Unavailable {
        reason: String,
    },
}

/// Storage handle shared by all request handlers.
///
/// Built once at startup and never reconfigured. Cloning is cheap.
#[derive(Clone)]
pub struct StorageClient {
    state: StorageState,
}

impl StorageClient {
    /// Connects to the configured store. Never fails: missing or invalid
    /// settings (`Err` with the reason) or a failed connection yield an
    /// unavailable client.
    pub async fn connect(config: Result<&DatabaseConfig, &str>) -> Self {
        let config = match config {
            Ok(config) => config,
            Err(reason) => {
                warn!("Database settings unusable, storage is unavailable: {}", reason);
                return Self::unavailable(reason);
            }
        };

        match PostgresStore::connect(config).await {
            Ok(store) => {
                info!("Document store ready (database: {})", config.name);
                Self::with_store(Arc::new(store), config.name.clone())
            }
            Err(e) => {
                warn!("Document store could not be initialised, storage is unavailable: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn with_store(store: Arc<dyn DocumentStore>, database_name: impl Into<String>) -> Self {
        Self {
            state: StorageState::Connected {
                store,
                database_name: database_name.into(),
            },
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: StorageState::Unavailable {
                reason: reason.into(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, StorageState::Connected { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            StorageState::Unavailable { reason } => Some(reason),
            StorageState::Connected { .. } => None,
        }
    }

    pub fn database_name(&self) -> Option<&str> {
        match &self.state {
            StorageState::Connected { database_name, .. } => Some(database_name),
            StorageState::Unavailable { .. } => None,
        }
    }

    /// Raw backend handle for ad-hoc queries.
    pub fn handle(&self) -> Option<Arc<dyn DocumentStore>> {
        match &self.state {
            StorageState::Connected { store, .. } => Some(Arc::clone(store)),
            StorageState::Unavailable { .. } => None,
        }
    }

    fn store(&self) -> ApiResult<&dyn DocumentStore> {
        match &self.state {
            StorageState::Connected { store, .. } => Ok(store.as_ref()),
            StorageState::Unavailable { .. } => Err(ApiError::StorageUnavailable),
        }
    }

    /// Serializes `record`, stamps `created_at`/`updated_at` and inserts it.
    pub async fn insert<T: Serialize>(&self, collection: &str, record: &T) -> ApiResult<String> {
        let store = self.store()?;

        let mut document = match serde_json::to_value(record) {
            Ok(Value::Object(document)) => document,
            Ok(other) => {
                return Err(ApiError::Internal(anyhow::anyhow!(
                    "record for collection '{}' serialized to a non-object value: {}",
                    collection,
                    other
                )))
            }
            Err(e) => {
                return Err(ApiError::Internal(anyhow::Error::new(e).context(format!(
                    "failed to serialize record for collection '{}'",
                    collection
                ))))
            }
        };

        // The store assigns identifiers
        document.remove(ID_FIELD);

        let now = format_timestamp(Utc::now());
        document.insert(CREATED_AT_FIELD.to_string(), Value::String(now.clone()));
        document.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));

        store.insert_document(collection, document).await
    }

    pub async fn find_one(&self, collection: &str, id: &str) -> ApiResult<Option<Document>> {
        self.store()?.find_one(collection, id).await
    }

    pub async fn find_many(
        &self,
        collection: &str,
        filter: &Document,
        sort: Option<&SortSpec>,
        limit: Option<u64>,
    ) -> ApiResult<Vec<Document>> {
        self.store()?.find_many(collection, filter, sort, limit).await
    }

    pub async fn list_collection_names(&self) -> ApiResult<Vec<String>> {
        self.store()?.list_collection_names().await
    }
}

//! In-memory [`DocumentStore`] for tests and local development.
//!
//! Data lives only as long as the process. Collections are kept in insertion
//! order behind a `tokio::sync::RwLock`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{new_object_id, Document, DocumentStore, SortDirection, SortSpec, ID_FIELD};
use crate::error::ApiResult;

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|value| !value.is_null());
    let b = b.filter(|value| !value.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, collection: &str, mut document: Document) -> ApiResult<String> {
        let id = new_object_id();
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document);

        debug!("Inserted document {} into in-memory collection '{}'", id, collection);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, id: &str) -> ApiResult<Option<Document>> {
        let collections = self.collections.read().await;

        Ok(collections.get(collection).and_then(|documents| {
            documents
                .iter()
                .find(|document| document.get(ID_FIELD).and_then(Value::as_str) == Some(id))
                .cloned()
        }))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Document,
        sort: Option<&SortSpec>,
        limit: Option<u64>,
    ) -> ApiResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Document> = documents
            .iter()
            .filter(|document| matches_filter(document, filter))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            match sort.direction {
                SortDirection::Ascending => {
                    matched.sort_by(|a, b| compare_field(a.get(&sort.field), b.get(&sort.field)));
                }
                SortDirection::Descending => {
                    // Newest insertion first among equal keys
                    matched.reverse();
                    matched.sort_by(|a, b| compare_field(b.get(&sort.field), a.get(&sort.field)));
                }
            }
        }

        if let Some(limit) = limit {
            matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(matched)
    }

    async fn list_collection_names(&self) -> ApiResult<Vec<String>> {
        let collections = self.collections.read().await;

        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        Ok(names)
    }
}

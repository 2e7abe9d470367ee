use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};

/// Collection that holds wish documents.
pub const WISH_COLLECTION: &str = "wish";

pub const REQUIRED_FIELDS_MESSAGE: &str = "Name and message are required";

/// Wish as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wish {
    pub id: String,
    pub name: String,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /wishes`
#[derive(Debug, Deserialize)]
pub struct CreateWishRequest {
    pub name: String,
    pub message: String,
}

/// Trimmed fields as they are written to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWish {
    pub name: String,
    pub message: String,
}

impl CreateWishRequest {
    /// Trims both fields; either one ending up empty is a validation failure.
    pub fn validate(&self) -> Result<NewWish, String> {
        let name = self.name.trim();
        let message = self.message.trim();

        if name.is_empty() || message.is_empty() {
            return Err(REQUIRED_FIELDS_MESSAGE.to_string());
        }

        Ok(NewWish {
            name: name.to_string(),
            message: message.to_string(),
        })
    }
}

impl Wish {
    /// Maps a stored document onto the output shape. Missing text fields
    /// become empty strings, missing or unparsable timestamps become `None`.
    pub fn from_document(document: &Document) -> Self {
        let id = match document.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Wish {
            id,
            name: text_field(document, "name"),
            message: text_field(document, "message"),
            created_at: timestamp_field(document, CREATED_AT_FIELD),
            updated_at: timestamp_field(document, UPDATED_AT_FIELD),
        }
    }

    /// Response used when the inserted document cannot be read back.
    pub fn from_inserted(id: String, wish: NewWish) -> Self {
        Wish {
            id,
            name: wish.name,
            message: wish.message,
            created_at: None,
            updated_at: None,
        }
    }
}

fn text_field(document: &Document, key: &str) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn timestamp_field(document: &Document, key: &str) -> Option<DateTime<Utc>> {
    let raw = document.get(key)?.as_str()?;

    match DateTime::parse_from_rfc3339(raw) {
        Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!("Ignoring unparsable {} '{}': {}", key, raw, e);
            None
        }
    }
}

use crate::error::DatabaseError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A flat JSON object. Records and filters are both documents.
pub type Document = Map<String, Value>;

/// Opens sessions against a backing document store.
///
/// Every store operation in this crate opens its own session and closes it
/// when done; implementations may pool underneath as long as each session
/// behaves like a fresh connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreSession>, DatabaseError>;
}

/// A single open connection to the document store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreSession: Send {
    async fn ping(&mut self) -> Result<(), DatabaseError>;

    async fn insert_one(&mut self, collection: &str, document: Document) -> Result<(), DatabaseError>;

    /// First document in `collection` matching every field of `filter`.
    async fn find_one(&mut self, collection: &str, filter: &Document) -> Result<Option<Document>, DatabaseError>;

    /// Deletes at most one matching document and returns how many were removed.
    async fn delete_one(&mut self, collection: &str, filter: &Document) -> Result<u64, DatabaseError>;

    async fn disconnect(&mut self) -> Result<(), DatabaseError>;
}

/// True when every field of `filter` is present in `document` with an equal value.
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Document, DatabaseError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::MalformedDocument(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, DatabaseError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

use crate::db::document::{matches, Document, DocumentStore, StoreSession};
use crate::error::DatabaseError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Collections = HashMap<String, Vec<Document>>;

/// Process-local document store. Sessions share the same collections, so
/// it behaves like a single database that every connection sees.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreSession>, DatabaseError> {
        Ok(Box::new(MemorySession {
            collections: Some(self.collections.clone()),
        }))
    }
}

struct MemorySession {
    collections: Option<Arc<RwLock<Collections>>>,
}

impl MemorySession {
    fn open(&self) -> Result<&Arc<RwLock<Collections>>, DatabaseError> {
        self.collections
            .as_ref()
            .ok_or_else(|| DatabaseError::ConnectionError("session is disconnected".into()))
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn ping(&mut self) -> Result<(), DatabaseError> {
        self.open().map(|_| ())
    }

    async fn insert_one(&mut self, collection: &str, document: Document) -> Result<(), DatabaseError> {
        let mut collections = self.open()?.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn find_one(&mut self, collection: &str, filter: &Document) -> Result<Option<Document>, DatabaseError> {
        let collections = self.open()?.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| matches(doc, filter)))
            .cloned())
    }

    async fn delete_one(&mut self, collection: &str, filter: &Document) -> Result<u64, DatabaseError> {
        let mut collections = self.open()?.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|doc| matches(doc, filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn disconnect(&mut self) -> Result<(), DatabaseError> {
        self.collections
            .take()
            .map(|_| ())
            .ok_or_else(|| DatabaseError::ConnectionError("session already disconnected".into()))
    }
}

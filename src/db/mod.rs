//! Document store access for the session server.
//!
//! The core only talks to a `DocumentStore`: a connection factory whose
//! sessions can ping, insert, find and delete flat JSON documents in named
//! collections. `CredentialStore` and `TokenStore` are built on top of it.

pub mod document;
pub mod memory;
pub mod models;
pub mod operations;
pub mod postgres;

pub use document::{Document, DocumentStore, StoreSession};
pub use memory::MemoryStore;
pub use models::{CredentialRecord, TokenRecord};
pub use operations::{CredentialStore, TokenGrant, TokenStore};
pub use postgres::PgDocumentStore;

use crate::error::DatabaseError;

/// Connect, ping and disconnect. Used by the health endpoint.
pub async fn ping(store: &dyn DocumentStore) -> Result<(), DatabaseError> {
    let mut session = store.connect().await?;
    let pinged = session.ping().await;
    let closed = session.disconnect().await;
    pinged?;
    closed
}

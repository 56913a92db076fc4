use crate::db::document::{Document, DocumentStore, StoreSession};
use crate::error::DatabaseError;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Connection, PgConnection};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Documents live in a single JSONB table keyed by collection name.
/// A filter matches through JSONB containment (`@>`), which for flat string
/// documents is field-by-field equality.
///
/// The table is created on the first successful connection if
/// `ensure_schema` has not already done so.
pub struct PgDocumentStore {
    url: String,
    schema_ready: AtomicBool,
}

impl PgDocumentStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            schema_ready: AtomicBool::new(false),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        let mut conn = PgConnection::connect(&self.url).await?;
        let created = self.create_schema(&mut conn).await;
        conn.close().await?;
        created
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::Acquire)
    }

    async fn create_schema(&self, conn: &mut PgConnection) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                collection TEXT NOT NULL,
                body JSONB NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS documents_body_idx ON documents USING GIN (body)")
            .execute(&mut *conn)
            .await?;

        self.schema_ready.store(true, Ordering::Release);
        info!("Document schema ready");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn connect(&self) -> Result<Box<dyn StoreSession>, DatabaseError> {
        let mut conn = PgConnection::connect(&self.url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
        debug!("Opened document store connection");

        if !self.schema_ready() {
            self.create_schema(&mut conn).await?;
        }
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }
}

struct PgSession {
    conn: Option<PgConnection>,
}

impl PgSession {
    fn conn(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DatabaseError::ConnectionError("session is disconnected".into()))
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn ping(&mut self) -> Result<(), DatabaseError> {
        self.conn()?.ping().await?;
        Ok(())
    }

    async fn insert_one(&mut self, collection: &str, document: Document) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO documents (collection, body) VALUES ($1, $2)")
            .bind(collection)
            .bind(Json(document))
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn find_one(&mut self, collection: &str, filter: &Document) -> Result<Option<Document>, DatabaseError> {
        let found: Option<Json<Document>> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND body @> $2 ORDER BY id LIMIT 1",
        )
        .bind(collection)
        .bind(Json(filter))
        .fetch_optional(self.conn()?)
        .await?;

        Ok(found.map(|Json(doc)| doc))
    }

    async fn delete_one(&mut self, collection: &str, filter: &Document) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM documents WHERE id = (
                SELECT id FROM documents
                WHERE collection = $1 AND body @> $2
                ORDER BY id LIMIT 1
            )
            "#,
        )
        .bind(collection)
        .bind(Json(filter))
        .execute(self.conn()?)
        .await?;

        Ok(result.rows_affected())
    }

    async fn disconnect(&mut self) -> Result<(), DatabaseError> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::ConnectionError("session already disconnected".into()))?;
        conn.close().await?;
        Ok(())
    }
}

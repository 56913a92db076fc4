pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use actix_web::{web, HttpResponse};
use tracing::warn;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::{Settings, StoreBackend};

pub use auth::SessionService;
pub use db::{DocumentStore, MemoryStore, PgDocumentStore};

/// Health check endpoint handler
/// Reports server status, timestamp and whether the document store answers
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store = match db::ping(state.store.as_ref()).await {
        Ok(()) => "reachable",
        Err(e) => {
            warn!("Health check could not reach the document store: {}", e);
            "unreachable"
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "store": store,
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub store: Arc<dyn DocumentStore>,
    pub sessions: Arc<SessionService>,
}

impl AppState {
    /// Builds the configured backend. For Postgres this tries once to create
    /// the document table; an unreachable database is logged, not fatal.
    pub async fn new(config: Settings) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.database.backend {
            StoreBackend::Postgres => {
                let store = PgDocumentStore::new(config.database.url.clone());
                if let Err(e) = store.ensure_schema().await {
                    warn!("Document store not ready at startup, continuing: {}", e);
                }
                Arc::new(store)
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        Self::with_store(config, store)
    }

    pub fn with_store(config: Settings, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let sessions = SessionService::from_settings(&config, store.clone())?;

        Ok(Self {
            config: Arc::new(config),
            store,
            sessions: Arc::new(sessions),
        })
    }
}

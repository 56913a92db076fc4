use crate::auth::TokenSource;
use crate::db::document::{from_document, to_document, DocumentStore, StoreSession};
use crate::db::models::{CredentialRecord, TokenFilter, TokenRecord};
use crate::error::{AppError, DatabaseError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Disconnects `session` and returns the operation's result. A failed
/// disconnect fails an otherwise successful operation.
async fn finish<T, E>(mut session: Box<dyn StoreSession>, result: Result<T, E>) -> Result<T, E>
where
    E: From<DatabaseError>,
{
    let closed = session.disconnect().await;
    if let Err(e) = &closed {
        error!("Failed to disconnect from document store: {}", e);
    }
    let value = result?;
    closed?;
    Ok(value)
}

/// Connects and pings. Every store operation starts here.
async fn open(store: &dyn DocumentStore) -> Result<Box<dyn StoreSession>, DatabaseError> {
    let mut session = store.connect().await.map_err(|e| {
        error!("Failed to connect to document store: {}", e);
        e
    })?;
    if let Err(e) = session.ping().await {
        error!("Document store ping failed: {}", e);
        if let Err(close) = session.disconnect().await {
            error!("Failed to disconnect from document store: {}", close);
        }
        return Err(e);
    }
    Ok(session)
}

pub struct CredentialStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// True iff a record matches both encoded fields exactly.
    pub async fn find_user(&self, user: &str, secret: &str) -> Result<bool, DatabaseError> {
        let mut session = open(self.store.as_ref()).await?;
        let result = self.find_with(session.as_mut(), user, secret).await;
        finish(session, result).await
    }

    /// Inserts without checking for an existing record.
    pub async fn add_user(&self, user: &str, secret: &str) -> Result<(), DatabaseError> {
        let mut session = open(self.store.as_ref()).await?;
        let result = self.insert_with(session.as_mut(), user, secret).await;
        if result.is_ok() {
            info!("Inserted credential record");
        }
        finish(session, result).await
    }

    async fn find_with(
        &self,
        session: &mut dyn StoreSession,
        user: &str,
        secret: &str,
    ) -> Result<bool, DatabaseError> {
        let filter = to_document(&CredentialRecord::new(user, secret))?;
        Ok(session.find_one(&self.collection, &filter).await?.is_some())
    }

    async fn insert_with(
        &self,
        session: &mut dyn StoreSession,
        user: &str,
        secret: &str,
    ) -> Result<(), DatabaseError> {
        let document = to_document(&CredentialRecord::new(user, secret))?;
        session.insert_one(&self.collection, document).await
    }
}

/// Outcome of asking for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    Issued(String),
    /// A token already exists for this user. Its value is not disclosed.
    AlreadyIssued,
}

type IssueLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

fn lock_table(locks: &IssueLocks) -> StdMutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A caller's claim on a user's issue lock. Dropping it removes the table
/// entry once nobody else holds or awaits it, even if the owning future
/// was cancelled.
struct IssueSlot<'a> {
    locks: &'a IssueLocks,
    user: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> IssueSlot<'a> {
    fn claim(locks: &'a IssueLocks, user: &str) -> Self {
        let lock = lock_table(locks).entry(user.to_string()).or_default().clone();
        Self {
            locks,
            user: user.to_string(),
            lock,
        }
    }
}

impl Drop for IssueSlot<'_> {
    fn drop(&mut self) {
        let mut table = lock_table(self.locks);
        // The table and this slot are the only holders left.
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.user);
        }
    }
}

pub struct TokenStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
    generator: Box<dyn TokenSource>,
    issuing: IssueLocks,
}

impl TokenStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        generator: impl TokenSource + 'static,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            generator: Box::new(generator),
            issuing: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn find_token(&self, user: &str) -> Result<Option<TokenRecord>, DatabaseError> {
        let mut session = open(self.store.as_ref()).await?;
        let result = self.find_with(session.as_mut(), user).await;
        finish(session, result).await
    }

    pub async fn insert_token(&self, user: &str, token: &str) -> Result<(), DatabaseError> {
        let mut session = open(self.store.as_ref()).await?;
        let result = self.insert_with(session.as_mut(), user, token).await;
        finish(session, result).await
    }

    /// Removes the record matching both `user` and `token`. Matching nothing
    /// is not an error.
    pub async fn delete_token(&self, user: &str, token: &str) -> Result<(), DatabaseError> {
        let mut session = open(self.store.as_ref()).await?;
        let result = self.delete_with(session.as_mut(), user, token).await;
        match &result {
            Ok(removed) => info!("Deleted {} token record(s)", removed),
            Err(e) => error!("Failed to delete token record: {}", e),
        }
        finish(session, result).await.map(|_| ())
    }

    /// Looks up the user's token and mints one if none exists.
    ///
    /// Calls for the same user are serialized inside this process, so two
    /// concurrent requests cannot both insert.
    pub async fn add_or_get_token(&self, user: &str) -> Result<TokenGrant, AppError> {
        let slot = IssueSlot::claim(&self.issuing, user);
        let _guard = slot.lock.lock().await;
        self.lookup_or_create(user).await
    }

    async fn lookup_or_create(&self, user: &str) -> Result<TokenGrant, AppError> {
        let mut session = open(self.store.as_ref()).await?;
        let result = self.lookup_or_create_with(session.as_mut(), user).await;
        finish(session, result).await
    }

    async fn lookup_or_create_with(
        &self,
        session: &mut dyn StoreSession,
        user: &str,
    ) -> Result<TokenGrant, AppError> {
        if self.find_with(session, user).await?.is_some() {
            debug!("Token already issued for {}", user);
            return Ok(TokenGrant::AlreadyIssued);
        }
        let token = self.generator.generate(user)?;
        self.insert_with(session, user, &token).await?;
        info!("Inserted token record");
        Ok(TokenGrant::Issued(token))
    }

    async fn find_with(
        &self,
        session: &mut dyn StoreSession,
        user: &str,
    ) -> Result<Option<TokenRecord>, DatabaseError> {
        let filter = to_document(&TokenFilter { user, token: None })?;
        session
            .find_one(&self.collection, &filter)
            .await?
            .map(from_document)
            .transpose()
    }

    async fn insert_with(
        &self,
        session: &mut dyn StoreSession,
        user: &str,
        token: &str,
    ) -> Result<(), DatabaseError> {
        let document = to_document(&TokenRecord::new(user, token))?;
        session.insert_one(&self.collection, document).await
    }

    async fn delete_with(
        &self,
        session: &mut dyn StoreSession,
        user: &str,
        token: &str,
    ) -> Result<u64, DatabaseError> {
        let filter = to_document(&TokenFilter { user, token: Some(token) })?;
        session.delete_one(&self.collection, &filter).await
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        lock_table(&self.issuing).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document::{MockDocumentStore, MockStoreSession};
    use crate::auth::{MockTokenSource, TokenGenerator};
    use crate::db::MemoryStore;
    use crate::error::AuthError;
    use std::time::Duration;

    fn generator() -> TokenGenerator {
        TokenGenerator::new(8, 1, 1).unwrap()
    }

    fn token_store(store: &MemoryStore) -> TokenStore {
        TokenStore::new(Arc::new(store.clone()), "tokens", generator())
    }

    #[tokio::test]
    async fn test_add_and_find_user() {
        let store = MemoryStore::new();
        let credentials = CredentialStore::new(Arc::new(store.clone()), "credentials");

        assert!(!credentials.find_user("dXNlcg==", "cGFzcw==").await.unwrap());
        credentials.add_user("dXNlcg==", "cGFzcw==").await.unwrap();
        assert!(credentials.find_user("dXNlcg==", "cGFzcw==").await.unwrap());
        assert!(!credentials.find_user("dXNlcg==", "d3Jvbmc=").await.unwrap());
        assert!(!credentials.find_user("b3RoZXI=", "cGFzcw==").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_user_allows_duplicates() {
        let store = MemoryStore::new();
        let credentials = CredentialStore::new(Arc::new(store.clone()), "credentials");

        credentials.add_user("dXNlcg==", "cGFzcw==").await.unwrap();
        credentials.add_user("dXNlcg==", "cGFzcw==").await.unwrap();
        assert_eq!(store.documents("credentials").await.len(), 2);
    }

    #[tokio::test]
    async fn test_add_or_get_token() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);

        let first = tokens.add_or_get_token("dXNlcg==").await.unwrap();
        let TokenGrant::Issued(token) = first else {
            panic!("expected a fresh token, got {:?}", first);
        };
        assert_eq!(token.len(), crate::auth::TOKEN_LENGTH);

        let second = tokens.add_or_get_token("dXNlcg==").await.unwrap();
        assert_eq!(second, TokenGrant::AlreadyIssued);

        let stored = tokens.find_token("dXNlcg==").await.unwrap();
        assert_eq!(stored, Some(TokenRecord::new("dXNlcg==", token)));
        assert_eq!(tokens.pending_locks(), 0);
    }

    #[tokio::test]
    async fn test_delete_token_requires_both_fields() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        tokens.insert_token("dXNlcg==", "abc").await.unwrap();

        tokens.delete_token("dXNlcg==", "wrong").await.unwrap();
        tokens.delete_token("b3RoZXI=", "abc").await.unwrap();
        assert!(tokens.find_token("dXNlcg==").await.unwrap().is_some());

        tokens.delete_token("dXNlcg==", "abc").await.unwrap();
        assert!(tokens.find_token("dXNlcg==").await.unwrap().is_none());

        // Nothing left to match.
        tokens.delete_token("dXNlcg==", "abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_issue_creates_one_record() {
        let store = MemoryStore::new();
        let tokens = Arc::new(token_store(&store));

        let calls = (0..8).map(|_| {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.add_or_get_token("dXNlcg==").await.unwrap() })
        });
        let grants = futures::future::join_all(calls).await;

        let issued = grants
            .into_iter()
            .map(|g| g.unwrap())
            .filter(|g| matches!(g, TokenGrant::Issued(_)))
            .count();
        assert_eq!(issued, 1);
        assert_eq!(store.documents("tokens").await.len(), 1);
        assert_eq!(tokens.pending_locks(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let mut store = MockDocumentStore::new();
        store
            .expect_connect()
            .returning(|| Err(DatabaseError::ConnectionError("refused".into())));

        let credentials = CredentialStore::new(Arc::new(store), "credentials");
        let result = credentials.add_user("dXNlcg==", "cGFzcw==").await;
        assert!(matches!(result, Err(DatabaseError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_ping_failure_still_disconnects() {
        let mut store = MockDocumentStore::new();
        store.expect_connect().times(1).returning(|| {
            let mut session = MockStoreSession::new();
            session
                .expect_ping()
                .returning(|| Err(DatabaseError::ConnectionError("no route".into())));
            session.expect_insert_one().never();
            session.expect_disconnect().times(1).returning(|| Ok(()));
            Ok(Box::new(session) as Box<dyn StoreSession>)
        });

        let credentials = CredentialStore::new(Arc::new(store), "credentials");
        assert!(credentials.find_user("dXNlcg==", "cGFzcw==").await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_failure_fails_insert() {
        let mut store = MockDocumentStore::new();
        store.expect_connect().returning(|| {
            let mut session = MockStoreSession::new();
            session.expect_ping().returning(|| Ok(()));
            session.expect_insert_one().times(1).returning(|_, _| Ok(()));
            session
                .expect_disconnect()
                .returning(|| Err(DatabaseError::ConnectionError("reset".into())));
            Ok(Box::new(session) as Box<dyn StoreSession>)
        });

        let credentials = CredentialStore::new(Arc::new(store), "credentials");
        assert!(credentials.add_user("dXNlcg==", "cGFzcw==").await.is_err());
    }

    #[tokio::test]
    async fn test_insert_failure_reported_from_add_or_get() {
        let mut store = MockDocumentStore::new();
        store.expect_connect().returning(|| {
            let mut session = MockStoreSession::new();
            session.expect_ping().returning(|| Ok(()));
            session.expect_find_one().returning(|_, _| Ok(None));
            session
                .expect_insert_one()
                .returning(|_, _| Err(DatabaseError::QueryError("duplicate".into())));
            session.expect_disconnect().returning(|| Ok(()));
            Ok(Box::new(session) as Box<dyn StoreSession>)
        });

        let tokens = TokenStore::new(Arc::new(store), "tokens", generator());
        let result = tokens.add_or_get_token("dXNlcg==").await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_insert() {
        let mut store = MockDocumentStore::new();
        store.expect_connect().returning(|| {
            let mut session = MockStoreSession::new();
            session.expect_ping().returning(|| Ok(()));
            session
                .expect_find_one()
                .returning(|_, _| Err(DatabaseError::QueryError("timeout".into())));
            session.expect_insert_one().never();
            session.expect_disconnect().returning(|| Ok(()));
            Ok(Box::new(session) as Box<dyn StoreSession>)
        });

        let tokens = TokenStore::new(Arc::new(store), "tokens", generator());
        let result = tokens.add_or_get_token("dXNlcg==").await;
        assert!(matches!(result, Err(AppError::DatabaseError(DatabaseError::QueryError(_)))));
        assert_eq!(tokens.pending_locks(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_skips_insert() {
        let store = MemoryStore::new();
        let mut source = MockTokenSource::new();
        source
            .expect_generate()
            .times(1)
            .returning(|_| Err(AuthError::TokenGeneration("no entropy".into())));

        let tokens = TokenStore::new(Arc::new(store.clone()), "tokens", source);
        let result = tokens.add_or_get_token("dXNlcg==").await;
        assert!(matches!(result, Err(AppError::AuthError(AuthError::TokenGeneration(_)))));
        assert!(store.documents("tokens").await.is_empty());
    }

    /// Connections that never complete.
    struct StalledStore;

    #[async_trait::async_trait]
    impl DocumentStore for StalledStore {
        async fn connect(&self) -> Result<Box<dyn StoreSession>, DatabaseError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_issue_releases_lock() {
        let tokens = TokenStore::new(Arc::new(StalledStore), "tokens", generator());

        let call = tokens.add_or_get_token("dXNlcg==");
        let outcome = tokio::time::timeout(Duration::from_millis(20), call).await;
        assert!(outcome.is_err());

        assert_eq!(tokens.pending_locks(), 0);
    }
}

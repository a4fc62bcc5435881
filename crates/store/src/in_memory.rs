//! In-memory session store: lost on restart, fine for tests and one-shot runs.

use agentry_core::error::StoreError;
use agentry_core::session::{RunSession, SessionStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sessions keyed by id; `list()` is sorted.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<BTreeMap<String, RunSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, session: &RunSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<RunSession, StoreError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }
}

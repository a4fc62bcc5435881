//! File-backed session store: one pretty-printed JSON file per session.
//!
//! Layout: `<dir>/<session_id>.json`. Files are human-inspectable and can be
//! reloaded with [`RunSession`]'s serde impls.

use agentry_core::error::StoreError;
use agentry_core::session::{RunSession, SessionStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const EXTENSION: &str = "json";

/// Stores each session as `<dir>/<id>.json`.
///
/// Writes are serialised through a lock so concurrent saves of the same
/// session never interleave.
pub struct FileSessionStore {
    dir: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl FileSessionStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Storage(format!(
                "invalid session id for file store: '{session_id}'"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.{EXTENSION}")))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, session: &RunSession) -> Result<(), StoreError> {
        let path = self.path_for(&session.session_id)?;
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Storage(format!("failed to serialize session: {e}")))?;

        let _guard = self.lock.write().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Storage(format!("failed to create {}: {e}", self.dir.display())))?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("failed to replace {}: {e}", path.display())))?;

        debug!(session_id = %session.session_id, path = %path.display(), "Saved session");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<RunSession, StoreError> {
        let path = self.path_for(session_id)?;
        let _guard = self.lock.read().await;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()));
            }
            Err(e) => {
                return Err(StoreError::Storage(format!("failed to read {}: {e}", path.display())));
            }
        };
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Storage(format!("corrupted session file {}: {e}", path.display())))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.read().await;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(format!("failed to list {}: {e}", self.dir.display()))),
        };

        let mut ids = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(session_id)?;
        let _guard = self.lock.write().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(format!("failed to delete {}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::event::{StepEvent, StepKind};
    use agentry_core::message::Message;

    fn sample_session(id: &str) -> RunSession {
        let mut session = RunSession::with_id(id);
        session.push_message(Message::user("what is 2+2?"));
        session.push_message(Message::assistant("4"));
        session.record(StepEvent::start(StepKind::Run, "assistant"));
        session.record(StepEvent::end(StepKind::Run, "assistant"));
        session
    }

    #[tokio::test]
    async fn roundtrip_preserves_messages_and_trace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));
        let session = sample_session("run-1");

        store.save(&session).await.unwrap();
        let loaded = store.load("run-1").await.unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.trace[1].seq, 1);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileSessionStore::new(dir.path()).save(&sample_session("a")).await.unwrap();

        let reopened = FileSessionStore::new(dir.path());
        assert_eq!(reopened.list().await.unwrap(), vec!["a"]);
        assert_eq!(reopened.load("a").await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
        assert!(matches!(store.load("x").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save(&sample_session("gone")).await.unwrap();
        assert!(store.delete("gone").await.unwrap());
        assert!(!store.delete("gone").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let err = store.save(&RunSession::with_id("../escape")).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn corrupted_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(matches!(store.load("bad").await, Err(StoreError::Storage(_))));
    }
}

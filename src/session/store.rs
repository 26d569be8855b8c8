//! Session Persistence Boundary
//!
//! Persistence layout belongs to the embedding application; the core
//! only defines the `SessionStore` trait and writes versioned,
//! checksummed checkpoints through it. Two implementations ship here:
//! an in-memory store for tests and embedding, and an append-only
//! JSON-lines file store used by the CLI for resume.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::types::{
    GenerationPhase, GenerationSession, NovelError, Result, SessionCheckpoint,
};

// =============================================================================
// Session Store Trait
// =============================================================================

/// External persistence boundary for session checkpoints.
///
/// Checkpoints are append-only: stores keep them in write order and
/// `load_latest` returns the most recent one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_checkpoint(&self, checkpoint: &SessionCheckpoint) -> Result<()>;
    async fn load_latest(&self, session_id: &str) -> Result<Option<SessionCheckpoint>>;
    async fn list_sessions(&self) -> Result<Vec<String>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

pub type SharedStore = Arc<dyn SessionStore>;

// =============================================================================
// In-Memory Store
// =============================================================================

/// Checkpoint store backed by a concurrent map, for tests and embedders
/// that persist elsewhere
#[derive(Default)]
pub struct MemoryStore {
    checkpoints: DashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_checkpoint(&self, checkpoint: &SessionCheckpoint) -> Result<()> {
        let json = checkpoint.to_json()?;
        self.checkpoints
            .entry(checkpoint.session_id.clone())
            .or_default()
            .push(json);
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<SessionCheckpoint>> {
        let Some(entries) = self.checkpoints.get(session_id) else {
            return Ok(None);
        };
        match entries.last() {
            Some(json) => Ok(Some(SessionCheckpoint::from_json(json)?)),
            None => Ok(None),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.checkpoints.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.checkpoints.remove(session_id);
        Ok(())
    }
}

// =============================================================================
// File Store
// =============================================================================

/// Append-only JSON-lines store, one file per session
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        // session ids are uuids; anything path-like is rejected
        if session_id.is_empty()
            || session_id
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-')
        {
            return Err(NovelError::Storage(format!(
                "invalid session id: {session_id}"
            )));
        }
        Ok(self.root.join(format!("{session_id}.jsonl")))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn save_checkpoint(&self, checkpoint: &SessionCheckpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.session_path(&checkpoint.session_id)?;
        let mut line = checkpoint.to_json()?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(session = %checkpoint.session_id, path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<SessionCheckpoint>> {
        let path = self.session_path(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match content.lines().filter(|l| !l.trim().is_empty()).last() {
            Some(line) => Ok(Some(SessionCheckpoint::from_json(line)?)),
            None => Ok(None),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".jsonl") {
                sessions.push(id.to_string());
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Checkpoint Manager
// =============================================================================

/// Writes a validated snapshot at every phase transition and restores
/// the latest one on resume
pub struct CheckpointManager {
    store: SharedStore,
}

impl CheckpointManager {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn checkpoint(
        &self,
        session: &GenerationSession,
        phase: GenerationPhase,
        chapter_number: Option<u32>,
    ) -> Result<()> {
        let checkpoint = SessionCheckpoint::capture(session, phase, chapter_number)?;
        self.store.save_checkpoint(&checkpoint).await
    }

    /// Restore the most recent consistent snapshot of a session
    pub async fn restore(&self, session_id: &str) -> Result<Option<GenerationSession>> {
        match self.store.load_latest(session_id).await? {
            Some(checkpoint) => Ok(Some(checkpoint.restore_session()?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeneratedChapter, SessionStatus};

    fn session() -> GenerationSession {
        GenerationSession::new(
            "Test Book",
            vec![GeneratedChapter::pending(1, "One")],
        )
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let mut s = session();
        let manager = CheckpointManager::new(Arc::new(store));

        manager
            .checkpoint(&s, GenerationPhase::Initializing, None)
            .await
            .unwrap();
        s.transition_to(SessionStatus::Generating).unwrap();
        manager
            .checkpoint(&s, GenerationPhase::Generating, Some(1))
            .await
            .unwrap();

        let restored = manager.restore(&s.id).await.unwrap().unwrap();
        assert_eq!(restored.status, SessionStatus::Generating);
        assert_eq!(restored.id, s.id);
    }

    #[tokio::test]
    async fn test_restore_unknown_session_is_none() {
        let manager = CheckpointManager::new(Arc::new(MemoryStore::new()));
        let restored = manager
            .restore("0c05a2f6-0000-0000-0000-000000000000")
            .await
            .unwrap();
        assert!(restored.is_none());
    }

    #[tokio::test]
    async fn test_file_store_appends_and_restores_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let mut s = session();

        let first = SessionCheckpoint::capture(&s, GenerationPhase::Initializing, None).unwrap();
        store.save_checkpoint(&first).await.unwrap();
        s.transition_to(SessionStatus::Generating).unwrap();
        let second = SessionCheckpoint::capture(&s, GenerationPhase::Generating, Some(1)).unwrap();
        store.save_checkpoint(&second).await.unwrap();

        let latest = store.load_latest(&s.id).await.unwrap().unwrap();
        assert_eq!(latest.phase, GenerationPhase::Generating);
        let restored = latest.restore_session().unwrap();
        assert_eq!(restored.status, SessionStatus::Generating);

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions, vec![s.id.clone()]);

        store.delete_session(&s.id).await.unwrap();
        assert!(store.load_latest(&s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_pathlike_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load_latest("../escape").await.is_err());
    }
}

//! Session stores: an in-process map and a directory of JSON records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::TaskResult;
use crate::session::TestSession;
use crate::traits::{FinalRecord, SessionStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a final record to a stored session: staged results first, then totals.
fn commit(
    mut session: TestSession,
    staged: Vec<TaskResult>,
    record: &FinalRecord,
) -> Result<TestSession, StoreError> {
    if session.is_finalized() {
        return Err(StoreError::AlreadyFinalized(session.id));
    }
    let id = session.id;
    for result in staged {
        session.append(result).map_err(|e| StoreError::Invalid(id, e))?;
    }
    session
        .close(
            record.overall_score,
            record.performance_label.clone(),
            record.finished_at,
        )
        .map_err(|e| StoreError::Invalid(id, e))?;
    session.feedback = Some(record.feedback_blob.clone());
    Ok(session)
}

fn check_owner(session: TestSession, owner_id: &str) -> Result<TestSession, StoreError> {
    if session.owner_id != owner_id {
        return Err(StoreError::OwnershipMismatch(session.id));
    }
    Ok(session)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MemoryEntry {
    session: TestSession,
    staged: Vec<TaskResult>,
}

/// Keeps sessions in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Uuid, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of results currently staged for a session.
    pub fn staged_count(&self, session_id: Uuid) -> usize {
        lock(&self.entries)
            .get(&session_id)
            .map_or(0, |entry| entry.staged.len())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, owner_id: &str, blueprint_id: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let session = TestSession::start(id, owner_id, blueprint_id, Utc::now());
        lock(&self.entries).insert(
            id,
            MemoryEntry {
                session,
                staged: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn append_task_result(
        &self,
        session_id: Uuid,
        result: &TaskResult,
    ) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        let entry = entries
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        if entry.session.is_finalized() {
            return Err(StoreError::AlreadyFinalized(session_id));
        }
        entry.staged.push(result.clone());
        Ok(())
    }

    async fn finalize(&self, session_id: Uuid, record: &FinalRecord) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        let entry = entries
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        let staged = std::mem::take(&mut entry.staged);
        match commit(entry.session.clone(), staged.clone(), record) {
            Ok(session) => {
                entry.session = session;
                Ok(())
            }
            Err(e) => {
                entry.staged = staged;
                Err(e)
            }
        }
    }

    async fn rollback(&self, session_id: Uuid) -> Result<(), StoreError> {
        if let Some(entry) = lock(&self.entries).get_mut(&session_id) {
            entry.staged.clear();
        }
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<TestSession, StoreError> {
        let session = lock(&self.entries)
            .get(&session_id)
            .map(|entry| entry.session.clone())
            .ok_or(StoreError::NotFound(session_id))?;
        check_owner(session, owner_id)
    }
}

// ---------------------------------------------------------------------------
// JsonDirStore
// ---------------------------------------------------------------------------

/// One `<session-id>.json` document per session under a directory.
///
/// Staged results are held in memory until `finalize`, which rewrites the
/// record through a temporary file in the same directory and renames it into
/// place. Readers therefore see either the `InProgress` record or the
/// complete finalized one.
#[derive(Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
    staged: Mutex<HashMap<Uuid, Vec<TaskResult>>>,
}

impl JsonDirStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            staged: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn read(&self, session_id: Uuid) -> Result<TestSession, StoreError> {
        let content = match std::fs::read_to_string(self.record_path(session_id)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, session: &TestSession) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, session)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(session.id))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonDirStore {
    async fn create_session(&self, owner_id: &str, blueprint_id: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.write(&TestSession::start(id, owner_id, blueprint_id, Utc::now()))?;
        Ok(id)
    }

    async fn append_task_result(
        &self,
        session_id: Uuid,
        result: &TaskResult,
    ) -> Result<(), StoreError> {
        if self.read(session_id)?.is_finalized() {
            return Err(StoreError::AlreadyFinalized(session_id));
        }
        lock(&self.staged)
            .entry(session_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn finalize(&self, session_id: Uuid, record: &FinalRecord) -> Result<(), StoreError> {
        let session = self.read(session_id)?;
        let staged = lock(&self.staged).remove(&session_id).unwrap_or_default();
        let outcome = commit(session, staged.clone(), record).and_then(|s| self.write(&s));
        if outcome.is_err() {
            lock(&self.staged).insert(session_id, staged);
        }
        outcome
    }

    async fn rollback(&self, session_id: Uuid) -> Result<(), StoreError> {
        lock(&self.staged).remove(&session_id);
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<TestSession, StoreError> {
        check_owner(self.read(session_id)?, owner_id)
    }
}

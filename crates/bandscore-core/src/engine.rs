//! Session engine: start a session, then validate, score, aggregate and
//! finalize one complete submission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{ScoreContext, ScoredResult, ScorerAdapter, ScorerBackend};
use crate::aggregate::{aggregate, TaskFeedback};
use crate::blueprint::{BlueprintCatalog, ResolvedTask, TaskBlueprint};
use crate::error::{EngineError, StateError, StoreError};
use crate::model::{TaskResult, TaskSubmission};
use crate::session::TestSession;
use crate::traits::{FinalRecord, SessionStore};

/// Configuration for the session engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent scorer calls per submission.
    pub parallelism: usize,
    /// Backend used when a submission does not pick one.
    pub default_backend: ScorerBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            default_backend: ScorerBackend::Local,
        }
    }
}

/// Returned by [`SessionEngine::start_session`].
#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: Uuid,
    pub blueprint: TaskBlueprint,
}

/// Returned by [`SessionEngine::submit_session`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub blueprint_id: String,
    pub overall_score: f64,
    pub reporting_max: f64,
    pub performance_label: String,
    pub overall_feedback: String,
    pub per_task_feedback: Vec<TaskFeedback>,
    pub finished_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Tasks that fell back to the worst-case score.
    pub fn degraded_tasks(&self) -> impl Iterator<Item = &TaskFeedback> {
        self.per_task_feedback
            .iter()
            .filter(|f| f.degradation.is_some())
    }
}

type LockMap = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

/// Holds a session's submit lock; the map entry goes away with the last holder.
struct SessionLock<'a> {
    locks: &'a LockMap,
    session_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if locks
            .get(&self.session_id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

/// The central evaluation engine.
pub struct SessionEngine {
    catalog: BlueprintCatalog,
    adapter: Arc<ScorerAdapter>,
    store: Arc<dyn SessionStore>,
    config: EngineConfig,
    // Serializes submits per session id.
    locks: LockMap,
}

impl SessionEngine {
    pub fn new(
        catalog: BlueprintCatalog,
        adapter: Arc<ScorerAdapter>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            adapter,
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &BlueprintCatalog {
        &self.catalog
    }

    /// Create an `InProgress` session for a blueprint variant.
    #[instrument(skip(self))]
    pub async fn start_session(
        &self,
        variant: &str,
        owner_id: &str,
    ) -> Result<StartedSession, EngineError> {
        let blueprint = self
            .catalog
            .get(variant)
            .ok_or_else(|| EngineError::UnknownBlueprint(variant.to_string()))?;
        let session_id = self
            .store
            .create_session(owner_id, blueprint.id())
            .await
            .map_err(EngineError::Persistence)?;
        info!(%session_id, tasks = blueprint.len(), "session started");
        Ok(StartedSession {
            session_id,
            blueprint: blueprint.clone(),
        })
    }

    /// Validate, score and finalize a complete submission.
    ///
    /// Validation runs before any scoring or persistence. Backend failures
    /// never surface here; they show up as degraded task feedback. Calls for
    /// the same session are serialized, so a concurrent loser observes
    /// [`StateError::SessionAlreadyFinalized`].
    #[instrument(skip(self, submissions), fields(tasks = submissions.len()))]
    pub async fn submit_session(
        &self,
        session_id: Uuid,
        owner_id: &str,
        submissions: &[TaskSubmission],
        backend: Option<ScorerBackend>,
    ) -> Result<SessionSummary, EngineError> {
        let _lock = self.lock_session(session_id).await;

        let mut session = self.store.get_session(session_id, owner_id).await?;
        session.ensure_open()?;
        let blueprint = self
            .catalog
            .get(&session.blueprint_id)
            .ok_or_else(|| EngineError::UnknownBlueprint(session.blueprint_id.clone()))?;

        let resolved = blueprint.validate(submissions)?;
        let backend = backend.unwrap_or(self.config.default_backend);
        let results = self.score_all(&resolved, backend).await;

        let agg = aggregate(&results, blueprint.reporting(), blueprint.bands());
        let layout: Vec<_> = resolved.iter().map(|t| (t.ordinal, t.kind())).collect();
        let finished_at = Utc::now();
        for result in &results {
            session.append(result.clone())?;
        }
        session.finalize(&layout, &agg, finished_at)?;

        let reporting = blueprint.reporting();
        let overall_feedback = format!(
            "Overall Score: {}/{} - Performance Level: {}",
            reporting.format(agg.overall_score),
            reporting.format(reporting.max),
            agg.performance_label
        );
        let record = FinalRecord {
            overall_score: agg.overall_score,
            performance_label: agg.performance_label.clone(),
            feedback_blob: serde_json::json!({
                "overall_feedback": overall_feedback,
                "detailed_feedback": agg.per_task_feedback,
            }),
            finished_at,
        };
        self.persist(session_id, &results, &record).await?;

        info!(
            %session_id,
            overall = agg.overall_score,
            label = %agg.performance_label,
            "session finalized"
        );
        Ok(SessionSummary {
            session_id,
            blueprint_id: session.blueprint_id,
            overall_score: agg.overall_score,
            reporting_max: reporting.max,
            performance_label: agg.performance_label,
            overall_feedback,
            per_task_feedback: agg.per_task_feedback,
            finished_at,
        })
    }

    /// Load a session for its owner.
    pub async fn session(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<TestSession, EngineError> {
        Ok(self.store.get_session(session_id, owner_id).await?)
    }

    async fn score_all(
        &self,
        tasks: &[ResolvedTask<'_>],
        backend: ScorerBackend,
    ) -> Vec<TaskResult> {
        let semaphore = Semaphore::new(self.config.parallelism.max(1));
        let mut pending = FuturesUnordered::new();

        for (index, task) in tasks.iter().enumerate() {
            let semaphore = &semaphore;
            let adapter = &self.adapter;
            pending.push(async move {
                let _permit = semaphore.acquire().await.ok();
                let ctx = ScoreContext {
                    kind: task.kind(),
                    prompt: task.slot.prompt.clone(),
                    backend,
                };
                let scored = adapter.score_submission(task.submission, &ctx).await;
                (index, build_result(task, scored))
            });
        }

        // Reassemble in blueprint order.
        let mut slots: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        while let Some((index, result)) = pending.next().await {
            if let Some(kind) = result.degradation {
                warn!(ordinal = result.ordinal, category = %kind, "task scored as degraded");
            }
            slots[index] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }

    async fn persist(
        &self,
        session_id: Uuid,
        results: &[TaskResult],
        record: &FinalRecord,
    ) -> Result<(), EngineError> {
        let write = async {
            for result in results {
                self.store.append_task_result(session_id, result).await?;
            }
            self.store.finalize(session_id, record).await
        };
        if let Err(e) = write.await {
            error!(%session_id, "failed to persist session: {e}");
            if let Err(rollback) = self.store.rollback(session_id).await {
                error!(%session_id, "rollback failed: {rollback}");
            }
            return Err(match e {
                StoreError::AlreadyFinalized(id) => StateError::SessionAlreadyFinalized(id).into(),
                other => EngineError::Persistence(other),
            });
        }
        Ok(())
    }

    async fn lock_session(&self, session_id: Uuid) -> SessionLock<'_> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(session_id).or_default())
        };
        SessionLock {
            locks: &self.locks,
            session_id,
            guard: Some(mutex.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn build_result(task: &ResolvedTask<'_>, scored: ScoredResult) -> TaskResult {
    let answered: Vec<_> = task.submission.answered().cloned().collect();
    TaskResult {
        ordinal: task.ordinal,
        section: task.slot.section,
        task_type: task.submission.task_type,
        question_ids: answered.iter().map(|a| a.question_id).collect(),
        raw_answers: answered,
        normalized_score: scored.normalized_score,
        native_score: scored.native_score,
        scale_used: scored.scale,
        feedback: scored.feedback,
        degradation: scored.degradation,
    }
}

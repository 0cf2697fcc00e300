//! Test session lifecycle: `InProgress -> Finalized`.
//!
//! A session only ever grows by appended task results and is closed exactly
//! once. After that it is write-once: every further mutation is rejected
//! with [`StateError::SessionAlreadyFinalized`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::error::StateError;
use crate::model::{TaskKind, TaskResult};

/// Lifecycle state of a test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Finalized,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::InProgress => write!(f, "in progress"),
            SessionState::Finalized => write!(f, "finalized"),
        }
    }
}

/// One candidate's attempt at a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub owner_id: String,
    pub state: SessionState,
    pub blueprint_id: String,
    #[serde(default)]
    pub task_results: Vec<TaskResult>,
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub performance_label: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Structured feedback written on finalize.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<serde_json::Value>,
}

impl TestSession {
    /// A fresh, empty session in `InProgress`.
    pub fn start(
        id: Uuid,
        owner_id: impl Into<String>,
        blueprint_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            state: SessionState::InProgress,
            blueprint_id: blueprint_id.into(),
            task_results: Vec::new(),
            overall_score: 0.0,
            performance_label: None,
            started_at,
            finished_at: None,
            feedback: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == SessionState::Finalized
    }

    /// Fails unless the session still accepts results.
    pub fn ensure_open(&self) -> Result<(), StateError> {
        if self.is_finalized() {
            return Err(StateError::SessionAlreadyFinalized(self.id));
        }
        Ok(())
    }

    pub fn append(&mut self, result: TaskResult) -> Result<(), StateError> {
        self.ensure_open()?;
        self.task_results.push(result);
        Ok(())
    }

    /// Check the results against the expected `(ordinal, kind)` layout, then close.
    pub fn finalize(
        &mut self,
        layout: &[(u32, TaskKind)],
        aggregate: &Aggregate,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_open()?;
        if self.task_results.len() != layout.len() {
            return Err(StateError::IncompleteSession {
                expected: layout.len(),
                actual: self.task_results.len(),
            });
        }
        for (position, (result, (ordinal, kind))) in
            self.task_results.iter().zip(layout).enumerate()
        {
            if result.ordinal != *ordinal || result.kind() != *kind {
                return Err(StateError::ResultOutOfPlace {
                    position,
                    expected_ordinal: *ordinal,
                    expected: *kind,
                    actual_ordinal: result.ordinal,
                    actual: result.kind(),
                });
            }
        }
        self.close(
            aggregate.overall_score,
            aggregate.performance_label.clone(),
            finished_at,
        )
    }

    /// Record the totals and move to `Finalized`.
    ///
    /// Stores call this after the engine has already checked the layout.
    pub fn close(
        &mut self,
        overall_score: f64,
        performance_label: String,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_open()?;
        self.overall_score = overall_score;
        self.performance_label = Some(performance_label);
        self.finished_at = Some(finished_at);
        self.state = SessionState::Finalized;
        Ok(())
    }
}

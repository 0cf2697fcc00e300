//! Core trait definitions for scoring backends and session storage.
//!
//! Backends are implemented by the `bandscore-scorers` crate; stores live in
//! [`crate::store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BackendError, StoreError};
use crate::model::{TaskKind, TaskResult};
use crate::scale::ScoreScale;
use crate::session::TestSession;

// ---------------------------------------------------------------------------
// Scoring backend trait
// ---------------------------------------------------------------------------

/// A scorer that turns one task's text into a native score and feedback.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Human-readable backend name (e.g. "gemini").
    fn name(&self) -> &str;

    /// The native scale this backend reports on.
    fn scale(&self) -> ScoreScale;

    /// Score one task.
    ///
    /// Failures should be returned as [`BackendError`] so the adapter can
    /// classify them; anything else is treated as the backend being unavailable.
    async fn score(&self, request: &ScoreRequest) -> anyhow::Result<BackendVerdict>;
}

/// Input for a single scoring call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// The task's combined answer text.
    pub text: String,
    pub kind: TaskKind,
    /// Prompt of the blueprint slot, when known.
    #[serde(default)]
    pub prompt: Option<String>,
}

/// What a backend returned, before range checks and normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendVerdict {
    pub native_score: f64,
    pub feedback: Vec<String>,
}

// ---------------------------------------------------------------------------
// Persistence gateway trait
// ---------------------------------------------------------------------------

/// Totals written when a session is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRecord {
    pub overall_score: f64,
    pub performance_label: String,
    /// Opaque structured feedback (`overall_feedback` + `detailed_feedback`).
    pub feedback_blob: serde_json::Value,
    pub finished_at: DateTime<Utc>,
}

/// Durable storage for test sessions.
///
/// `append_task_result` only stages results. They become visible together
/// with the totals when `finalize` succeeds; a failed finalize must leave the
/// stored session `InProgress`, and `rollback` drops whatever was staged.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, owner_id: &str, blueprint_id: &str) -> Result<Uuid, StoreError>;

    async fn append_task_result(
        &self,
        session_id: Uuid,
        result: &TaskResult,
    ) -> Result<(), StoreError>;

    /// Commit staged results and totals in one write.
    ///
    /// Fails with [`StoreError::AlreadyFinalized`] if the stored session is
    /// already terminal.
    async fn finalize(&self, session_id: Uuid, record: &FinalRecord) -> Result<(), StoreError>;

    async fn rollback(&self, session_id: Uuid) -> Result<(), StoreError>;

    async fn get_session(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<TestSession, StoreError>;
}

// ---------------------------------------------------------------------------
// Structured output extraction
// ---------------------------------------------------------------------------

/// Feedback used when a backend returns a score without any feedback items.
pub const NO_FEEDBACK: &str = "No specific feedback available.";

/// Locate the JSON object inside free-form model output.
///
/// Takes everything from the first `{` to the last `}`, which also strips
/// markdown fences and chatter around the object.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

/// Parse a `{"score": .., "feedback": [..]}` verdict out of model output.
///
/// The score may be a JSON number or a numeric string. Feedback may be a
/// list (non-string items are stringified, empty ones dropped) or a single
/// string. Range checking is left to the caller, which knows the scale.
pub fn parse_score_verdict(response: &str) -> Result<BackendVerdict, BackendError> {
    let json = extract_json_object(response)
        .ok_or_else(|| BackendError::MalformedResponse("no JSON object in response".into()))?;
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BackendError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let native_score = match value.get("score") {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| BackendError::MalformedResponse("missing or non-numeric score".into()))?;

    let mut feedback: Vec<String> = match value.get("feedback") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };
    if feedback.is_empty() {
        feedback.push(NO_FEEDBACK.to_string());
    }

    Ok(BackendVerdict {
        native_score,
        feedback,
    })
}

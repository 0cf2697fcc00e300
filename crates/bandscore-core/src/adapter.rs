//! Scorer adapter: one uniform, failure-isolating entry point over the
//! configured scoring backends.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::{BackendError, DegradationKind};
use crate::model::{TaskKind, TaskSubmission};
use crate::scale::ScoreScale;
use crate::traits::{ScoreRequest, ScoringBackend};

/// Which backend scores a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerBackend {
    /// Local feature-based regressor.
    Local,
    /// Remote generative evaluator.
    Remote,
}

impl fmt::Display for ScorerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerBackend::Local => write!(f, "local"),
            ScorerBackend::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for ScorerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "heuristic" => Ok(ScorerBackend::Local),
            "remote" | "gemini" => Ok(ScorerBackend::Remote),
            other => Err(format!("unknown scorer backend: {other}")),
        }
    }
}

/// Per-call scoring context.
#[derive(Debug, Clone)]
pub struct ScoreContext {
    pub kind: TaskKind,
    pub prompt: Option<String>,
    pub backend: ScorerBackend,
}

/// A normalized score, possibly degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    pub native_score: f64,
    pub normalized_score: f64,
    pub scale: ScoreScale,
    pub feedback: Vec<String>,
    pub degradation: Option<DegradationKind>,
}

impl ScoredResult {
    /// Worst-case result carrying a single feedback line with the category marker.
    pub fn degraded(scale: ScoreScale, kind: DegradationKind, detail: &str) -> Self {
        Self {
            native_score: scale.min(),
            normalized_score: 0.0,
            scale,
            feedback: vec![format!("{}: {detail}", kind.marker())],
            degradation: Some(kind),
        }
    }
}

/// Default per-call timeout.
pub const DEFAULT_SCORING_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches tasks to backends and normalizes their output.
///
/// Backends are constructed once and injected; the adapter holds them for
/// its whole lifetime. `score` never fails: backend errors, timeouts,
/// unparseable output and out-of-range scores all become degraded results.
pub struct ScorerAdapter {
    local: Option<Arc<dyn ScoringBackend>>,
    remote: Option<Arc<dyn ScoringBackend>>,
    timeout: Duration,
}

impl Default for ScorerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScorerAdapter {
    pub fn new() -> Self {
        Self {
            local: None,
            remote: None,
            timeout: DEFAULT_SCORING_TIMEOUT,
        }
    }

    pub fn with_local(mut self, backend: Arc<dyn ScoringBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    pub fn with_remote(mut self, backend: Arc<dyn ScoringBackend>) -> Self {
        self.remote = Some(backend);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self, choice: ScorerBackend) -> Option<&Arc<dyn ScoringBackend>> {
        match choice {
            ScorerBackend::Local => self.local.as_ref(),
            ScorerBackend::Remote => self.remote.as_ref(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Score a submission as one unit: its answers are trimmed and joined first.
    pub async fn score_submission(
        &self,
        submission: &TaskSubmission,
        ctx: &ScoreContext,
    ) -> ScoredResult {
        self.score(&submission.combined_text(), ctx).await
    }

    #[instrument(skip(self, task_text, ctx), fields(backend = %ctx.backend, kind = %ctx.kind))]
    pub async fn score(&self, task_text: &str, ctx: &ScoreContext) -> ScoredResult {
        let Some(backend) = self.backend(ctx.backend) else {
            warn!("no {} backend configured", ctx.backend);
            return ScoredResult::degraded(
                ScoreScale::default(),
                DegradationKind::BackendUnavailable,
                &format!("no {} scoring backend is configured", ctx.backend),
            );
        };

        let scale = backend.scale();
        let request = ScoreRequest {
            text: task_text.to_string(),
            kind: ctx.kind,
            prompt: ctx.prompt.clone(),
        };

        let verdict = match tokio::time::timeout(self.timeout, backend.score(&request)).await {
            Err(_) => {
                warn!(
                    backend = backend.name(),
                    "scoring timed out after {}s",
                    self.timeout.as_secs_f64()
                );
                return ScoredResult::degraded(
                    scale,
                    DegradationKind::BackendUnavailable,
                    &format!(
                        "{} did not answer within {:.1}s",
                        backend.name(),
                        self.timeout.as_secs_f64()
                    ),
                );
            }
            Ok(Err(e)) => {
                let kind = e
                    .downcast_ref::<BackendError>()
                    .map(BackendError::degradation)
                    .unwrap_or(DegradationKind::BackendUnavailable);
                warn!(backend = backend.name(), category = %kind, "scoring failed: {e:#}");
                return ScoredResult::degraded(
                    scale,
                    kind,
                    &format!("{} could not score this task ({e})", backend.name()),
                );
            }
            Ok(Ok(verdict)) => verdict,
        };

        if !scale.contains(verdict.native_score) {
            warn!(
                backend = backend.name(),
                score = verdict.native_score,
                "score outside the {scale} scale"
            );
            return ScoredResult::degraded(
                scale,
                DegradationKind::OutOfRange,
                &format!(
                    "{} returned {} on a {scale} scale",
                    backend.name(),
                    verdict.native_score
                ),
            );
        }

        let native_score = scale.quantize(verdict.native_score);
        ScoredResult {
            native_score,
            normalized_score: scale.normalize(native_score),
            scale,
            feedback: verdict.feedback,
            degradation: None,
        }
    }
}

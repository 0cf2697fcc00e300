//! Scripted scorer for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use bandscore_core::error::BackendError;
use bandscore_core::scale::ScoreScale;
use bandscore_core::traits::{parse_score_verdict, BackendVerdict, ScoreRequest, ScoringBackend};

/// What the mock does when a request matches.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A well-formed verdict.
    Score { score: f64, feedback: Vec<String> },
    /// Raw model output, run through the same JSON extraction as a real backend.
    Raw(String),
    /// Fail with the given backend error.
    Fail(BackendError),
    /// Never answer.
    Hang,
}

impl MockReply {
    pub fn score(score: f64) -> Self {
        MockReply::Score {
            score,
            feedback: vec![format!("mock feedback ({score})")],
        }
    }
}

/// A scoring backend for exercising the engine without real API calls.
///
/// Replies are chosen by the first registered substring found in the task
/// text, falling back to a default reply.
pub struct MockScorer {
    scale: ScoreScale,
    /// Text substring → reply, checked in insertion order.
    replies: Vec<(String, MockReply)>,
    default_reply: MockReply,
    call_count: AtomicU32,
    last_request: Mutex<Option<ScoreRequest>>,
}

impl MockScorer {
    pub fn new(scale: ScoreScale, default_reply: MockReply) -> Self {
        Self {
            scale,
            replies: Vec::new(),
            default_reply,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that always returns the same score.
    pub fn with_fixed_score(scale: ScoreScale, score: f64) -> Self {
        Self::new(scale, MockReply::score(score))
    }

    /// Reply with `reply` whenever the task text contains `needle`.
    pub fn on(mut self, needle: &str, reply: MockReply) -> Self {
        self.replies.push((needle.to_string(), reply));
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<ScoreRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ScoringBackend for MockScorer {
    fn name(&self) -> &str {
        "mock"
    }

    fn scale(&self) -> ScoreScale {
        self.scale
    }

    async fn score(&self, request: &ScoreRequest) -> anyhow::Result<BackendVerdict> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        let reply = self
            .replies
            .iter()
            .find(|(needle, _)| request.text.contains(needle.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default_reply);

        match reply {
            MockReply::Score { score, feedback } => Ok(BackendVerdict {
                native_score: *score,
                feedback: feedback.clone(),
            }),
            MockReply::Raw(output) => Ok(parse_score_verdict(output)?),
            MockReply::Fail(err) => Err(err.clone().into()),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

//! Error taxonomy for the evaluation engine.
//!
//! Validation and state errors are surfaced to the caller. Backend errors
//! never are: the scorer adapter downcasts them to a [`DegradationKind`] and
//! substitutes a worst-case task result instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{SlotKind, TaskKind};

/// A submission does not fit the blueprint it is answered against.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("blueprint requires exactly {expected} tasks, received {actual}")]
    TaskCountMismatch { expected: usize, actual: usize },

    #[error("task {ordinal}: expected {expected}, got {actual} (submitted as task {submitted_ordinal})")]
    TaskStructureMismatch {
        ordinal: u32,
        expected: SlotKind,
        actual: TaskKind,
        submitted_ordinal: u32,
    },

    #[error("task {ordinal}: no answers with non-empty text")]
    EmptyTaskAnswers { ordinal: u32 },
}

impl ValidationError {
    /// Ordinal of the offending task, if the error is tied to one.
    pub fn ordinal(&self) -> Option<u32> {
        match self {
            ValidationError::TaskCountMismatch { .. } => None,
            ValidationError::TaskStructureMismatch { ordinal, .. }
            | ValidationError::EmptyTaskAnswers { ordinal } => Some(*ordinal),
        }
    }
}

/// Lifecycle violations on a test session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("session {0} is already finalized")]
    SessionAlreadyFinalized(Uuid),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("session {0} belongs to a different owner")]
    OwnershipMismatch(Uuid),

    #[error("cannot finalize: blueprint has {expected} tasks, session holds {actual} results")]
    IncompleteSession { expected: usize, actual: usize },

    #[error("result at position {position} does not match the blueprint slot (expected task {expected_ordinal} {expected}, got task {actual_ordinal} {actual})")]
    ResultOutOfPlace {
        position: usize,
        expected_ordinal: u32,
        expected: TaskKind,
        actual_ordinal: u32,
        actual: TaskKind,
    },
}

/// Why a task result was replaced by the worst-case score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    ParseError,
    OutOfRange,
    BackendUnavailable,
}

impl DegradationKind {
    /// Marker string embedded in the synthetic feedback line.
    pub fn marker(self) -> &'static str {
        match self {
            DegradationKind::ParseError => "parse_error",
            DegradationKind::OutOfRange => "out_of_range",
            DegradationKind::BackendUnavailable => "backend_unavailable",
        }
    }
}

impl std::fmt::Display for DegradationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.marker())
    }
}

/// Errors that can occur when calling a scoring backend.
///
/// Defined here rather than in `bandscore-scorers` so the adapter can
/// downcast and classify failures without string matching.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The backend answered, but not with a usable score.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Degradation category the adapter records for this failure.
    pub fn degradation(&self) -> DegradationKind {
        match self {
            BackendError::MalformedResponse(_) => DegradationKind::ParseError,
            _ => DegradationKind::BackendUnavailable,
        }
    }
}

/// Errors raised by a [`SessionStore`](crate::traits::SessionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("session {0} belongs to a different owner")]
    OwnershipMismatch(Uuid),

    #[error("session {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("session {0}: {1}")]
    Invalid(Uuid, #[source] StateError),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid blueprint or band table definitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlueprintError {
    #[error("blueprint '{0}' has no task slots")]
    Empty(String),

    #[error("blueprint '{id}': slot {position} has ordinal {ordinal}, expected {expected}")]
    NonContiguousOrdinal {
        id: String,
        position: usize,
        ordinal: u32,
        expected: u32,
    },

    #[error("band thresholds must be finite and distinct (offending threshold: {0})")]
    InvalidBand(f64),

    #[error("reporting scale max must be greater than min (min {min}, max {max})")]
    InvalidReportingScale { min: f64, max: f64 },
}

/// Top-level error returned by the session engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("unknown blueprint variant: {0}")]
    UnknownBlueprint(String),

    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => StateError::SessionNotFound(id).into(),
            StoreError::OwnershipMismatch(id) => StateError::OwnershipMismatch(id).into(),
            StoreError::AlreadyFinalized(id) => StateError::SessionAlreadyFinalized(id).into(),
            other => EngineError::Persistence(other),
        }
    }
}

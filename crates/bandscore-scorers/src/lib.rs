//! bandscore-scorers: Scoring backend integrations.
//!
//! Implements the `ScoringBackend` trait for the remote Gemini evaluator and
//! the local heuristic regressor, plus a scripted mock for tests, and builds
//! the scorer adapter from a configuration file.

pub mod config;
pub mod gemini;
pub mod heuristic;
pub mod mock;

pub use bandscore_core::error::BackendError;
pub use config::{
    build_adapter, create_backend, load_config, load_config_from, BackendConfig, BandscoreConfig,
};
pub use gemini::{GeminiScorer, LearningFeedback, RubricFraming};
pub use heuristic::HeuristicScorer;
pub use mock::{MockReply, MockScorer};

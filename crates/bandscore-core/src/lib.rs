//! bandscore-core: Test session evaluation engine.
//!
//! This crate defines the data model, blueprints and their validator, the
//! scorer adapter that normalizes heterogeneous backends, the score
//! aggregator, the session state machine and the persistence gateway that
//! the rest of bandscore builds on.

pub mod adapter;
pub mod aggregate;
pub mod blueprint;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod scale;
pub mod session;
pub mod store;
pub mod traits;

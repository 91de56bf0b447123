//! exampaper-core: Question distribution and allocation engine.
//!
//! Weighs syllabus topics from previously-asked question history, splits a
//! paper's question budget across topics and recency buckets, seeds each slot
//! from history or marks it for synthesis, and verifies generated questions.
//! The engine orchestrates the pipeline against a topic graph reader and a
//! question generator.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod planner;
pub mod prompt;
pub mod report;
pub mod resolver;
pub mod traits;
pub mod verifier;
pub mod weights;

pub use engine::{ExamEngine, ExamEngineConfig, Granularity, NoopReporter, ProgressReporter};
pub use error::{ExamError, ProviderError};

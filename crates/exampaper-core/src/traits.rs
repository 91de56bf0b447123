//! Core trait definitions for the topic graph and question generators.
//!
//! `TopicGraphReader` is implemented by the catalog reader in this crate;
//! `QuestionGenerator` by the `exampaper-providers` crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{GeneratedQuestion, PyqRecord, Slot, Subject, Topic};

// ---------------------------------------------------------------------------
// Topic graph reader
// ---------------------------------------------------------------------------

/// Read-only access to subjects, topics and PYQ history.
///
/// Implementations must return results in a stable order: the planner's tie
/// breaks depend on it.
#[async_trait]
pub trait TopicGraphReader: Send + Sync {
    /// Every subject the graph knows about.
    async fn list_subjects(&self) -> anyhow::Result<Vec<Subject>>;

    /// All topics of `subject_id`, roots and descendants alike.
    async fn list_topics(&self, subject_id: &str) -> anyhow::Result<Vec<Topic>>;

    /// PYQ records attached directly to `topic_id`, asked in or before
    /// `up_to_year`.
    async fn list_pyq_records(
        &self,
        topic_id: &str,
        up_to_year: i32,
    ) -> anyhow::Result<Vec<PyqRecord>>;
}

// ---------------------------------------------------------------------------
// Question generator
// ---------------------------------------------------------------------------

/// Trait for wording backends that turn a slot into question text.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Human-readable generator name (e.g. "openai").
    fn name(&self) -> &str;

    /// Word one question for the slot. Fails when the model is unreachable
    /// or returns nothing usable.
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedQuestion>;
}

/// Everything a generator needs to word one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Subject display name, e.g. "Electrical Engineering".
    pub subject_name: String,
    pub slot: Slot,
}

impl GenerationRequest {
    pub fn new(subject_name: impl Into<String>, slot: Slot) -> Self {
        Self {
            subject_name: subject_name.into(),
            slot,
        }
    }

    /// The user prompt for this slot.
    pub fn prompt(&self) -> String {
        crate::prompt::build_prompt(&self.subject_name, &self.slot)
    }

    /// Wrap raw model output as a question for this slot.
    ///
    /// The concept and difficulty are the slot's own; the model is only
    /// trusted with the wording.
    pub fn answer(&self, text: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            concept: self.slot.topic_name.clone(),
            difficulty: self.slot.difficulty.to_string(),
            question: crate::prompt::clean_output(text),
        }
    }
}

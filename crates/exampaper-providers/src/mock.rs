//! Mock generator for testing and offline dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use exampaper_core::error::ProviderError;
use exampaper_core::model::GeneratedQuestion;
use exampaper_core::traits::{GenerationRequest, QuestionGenerator};

/// A mock question generator for exercising the engine without API calls.
///
/// By default every slot gets a distinct, verifiable question. Specific
/// slots can be given fixed text or made to fail.
pub struct MockGenerator {
    /// Slot index → fixed response text.
    responses: HashMap<usize, String>,
    /// Slot indices that always fail with a network error.
    failing: HashSet<usize>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            failing: HashSet::new(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Answer `slot` with `text` instead of the generated default.
    pub fn with_response(mut self, slot: usize, text: &str) -> Self {
        self.responses.insert(slot, text.to_string());
        self
    }

    /// Make every call for `slot` fail.
    pub fn failing_on(mut self, slot: usize) -> Self {
        self.failing.insert(slot);
        self
    }

    /// Get the number of calls made to this generator.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this generator.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuestionGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedQuestion> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let slot = &request.slot;
        if self.failing.contains(&slot.index) {
            return Err(ProviderError::NetworkError(format!(
                "mock failure for slot {}",
                slot.index
            ))
            .into());
        }

        let text = self.responses.get(&slot.index).cloned().unwrap_or_else(|| {
            let source = match slot.seed_record() {
                Some(record) => format!("in the style of {} ({})", record.id, record.year),
                None => "as a fresh problem".to_string(),
            };
            format!(
                "{} question {} on {}, written {}: state the governing relation and apply it?",
                slot.difficulty,
                slot.index + 1,
                slot.topic_name,
                source
            )
        });
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyOutput.into());
        }
        Ok(request.answer(&text))
    }
}

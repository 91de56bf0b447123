//! Ollama (local LLM) generator.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use exampaper_core::error::ProviderError;
use exampaper_core::model::GeneratedQuestion;
use exampaper_core::prompt::SYSTEM_PROMPT;
use exampaper_core::traits::{GenerationRequest, QuestionGenerator};

use crate::config::GenerationSettings;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Local models are slower; never time out before this.
const MIN_TIMEOUT_SECS: u64 = 300;

/// Ollama local LLM generator.
pub struct OllamaGenerator {
    base_url: String,
    settings: GenerationSettings,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, settings: GenerationSettings) -> anyhow::Result<Self> {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };
        let timeout_secs = settings.timeout_secs.max(MIN_TIMEOUT_SECS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            settings,
            timeout_secs,
            client,
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl QuestionGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %self.settings.model, slot = request.slot.index))]
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedQuestion> {
        let body = OllamaRequest {
            model: self.settings.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: request.prompt(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    ProviderError::NetworkError(format!(
                        "Ollama not reachable at {}. Is it running? Start with: ollama serve",
                        self.base_url
                    ))
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ModelNotFound(format!(
                "Model '{}' not found locally. Pull it with: ollama pull {}",
                self.settings.model, self.settings.model
            ))
            .into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: OllamaResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let question = request.answer(&api_response.message.content);
        if question.question.is_empty() {
            return Err(ProviderError::EmptyOutput.into());
        }
        Ok(question)
    }
}

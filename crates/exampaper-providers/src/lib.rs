//! exampaper-providers: Question generator backends.
//!
//! Implements the `QuestionGenerator` trait for OpenAI-compatible chat APIs
//! (OpenAI, Groq and similar), Ollama, and an offline mock, plus the
//! configuration file that selects between them.

pub mod config;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{
    create_generator, load_config, load_config_from, GenerationSettings, PaperConfig,
    ProviderConfig,
};
pub use exampaper_core::error::ProviderError;

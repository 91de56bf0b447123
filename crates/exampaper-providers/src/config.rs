//! Configuration file and generator factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use exampaper_core::engine::{ExamEngineConfig, Granularity};
use exampaper_core::planner::PlannerConfig;
use exampaper_core::resolver::DifficultyMix;
use exampaper_core::traits::QuestionGenerator;
use exampaper_core::verifier::VerifierConfig;
use exampaper_core::weights::WeightConfig;

use crate::mock::MockGenerator;
use crate::ollama::OllamaGenerator;
use crate::openai::OpenAiGenerator;

/// Base URL of Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

/// Configuration for a single question generator backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Any OpenAI-compatible chat completions API (OpenAI, Groq, ...).
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Offline generator, no network.
    Mock,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock => f.write_str("Mock"),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Per-call settings shared by every HTTP generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// HTTP timeout for a single call.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: 120,
        }
    }
}

/// Top-level exampaper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for question wording.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Token cap per generated question.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Max retries on generator errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Max concurrent generator calls.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Deadline for the generation phase of one paper.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Regeneration rounds for questions that fail verification.
    #[serde(default = "default_regeneration_rounds")]
    pub regeneration_rounds: u32,
    /// Directory holding subject catalog files.
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,
    /// Output directory for generated papers.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub weights: WeightConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub difficulty_mix: DifficultyMix,
    #[serde(default)]
    pub verifier: VerifierConfig,
}

fn default_provider() -> String {
    "groq".to_string()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_temperature() -> f64 {
    0.35
}
fn default_max_tokens() -> u32 {
    220
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}
fn default_regeneration_rounds() -> u32 {
    2
}
fn default_catalog_dir() -> PathBuf {
    PathBuf::from("./catalog")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./exampaper-output")
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            parallelism: default_parallelism(),
            request_timeout_secs: None,
            regeneration_rounds: default_regeneration_rounds(),
            catalog_dir: default_catalog_dir(),
            output_dir: default_output_dir(),
            granularity: Granularity::default(),
            weights: WeightConfig::default(),
            planner: PlannerConfig::default(),
            difficulty_mix: DifficultyMix::default(),
            verifier: VerifierConfig::default(),
        }
    }
}

impl PaperConfig {
    /// Engine settings derived from this file.
    pub fn engine_config(&self) -> ExamEngineConfig {
        ExamEngineConfig {
            parallelism: self.parallelism,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            regeneration_rounds: self.regeneration_rounds,
            weights: self.weights.clone(),
            planner: self.planner.clone(),
            difficulty_mix: self.difficulty_mix.clone(),
            verifier: self.verifier.clone(),
            granularity: self.granularity,
        }
    }

    /// Generator settings, optionally for a model other than the default.
    pub fn generation_settings(&self, model: Option<&str>) -> GenerationSettings {
        GenerationSettings {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..GenerationSettings::default()
        }
    }

    /// Look up a provider by name.
    ///
    /// `mock` and `ollama` work without a config entry; anything else must be
    /// configured.
    pub fn provider(&self, name: &str) -> Result<ProviderConfig> {
        if let Some(config) = self.providers.get(name) {
            return Ok(config.clone());
        }
        match name {
            "mock" => Ok(ProviderConfig::Mock),
            "ollama" => Ok(ProviderConfig::Ollama {
                base_url: default_ollama_url(),
            }),
            _ => {
                let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
                known.sort_unstable();
                anyhow::bail!(
                    "provider '{name}' is not configured (configured: {})",
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                )
            }
        }
    }

    /// Apply `EXAMPAPER_OPENAI_KEY` / `EXAMPAPER_GROQ_KEY` style overrides,
    /// reading variables through `var`.
    fn apply_key_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let overrides = [
            ("EXAMPAPER_OPENAI_KEY", "openai", None),
            ("EXAMPAPER_GROQ_KEY", "groq", Some(GROQ_BASE_URL)),
        ];
        for (env, name, base_url) in overrides {
            let Some(key) = var(env) else { continue };
            let entry = self
                .providers
                .entry(name.into())
                .or_insert_with(|| ProviderConfig::OpenAI {
                    api_key: String::new(),
                    base_url: base_url.map(String::from),
                });
            if let ProviderConfig::OpenAI { api_key, .. } = entry {
                *api_key = key;
            }
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unset variables resolve to the empty string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + len];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI { api_key, base_url } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock => ProviderConfig::Mock,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `exampaper.toml` in the current directory
/// 2. `~/.config/exampaper/config.toml`
///
/// Environment variable overrides: `EXAMPAPER_OPENAI_KEY`, `EXAMPAPER_GROQ_KEY`.
pub fn load_config() -> Result<PaperConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PaperConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("exampaper.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config_file(&path)?
        }
        None => PaperConfig::default(),
    };

    config.apply_key_overrides(|name| std::env::var(name).ok());

    // Resolve env vars in all provider configs
    let resolved: HashMap<String, ProviderConfig> = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.providers = resolved;

    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<PaperConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<PaperConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("exampaper"))
}

/// Create a generator instance from its configuration.
pub fn create_generator(
    name: &str,
    config: &ProviderConfig,
    settings: GenerationSettings,
) -> Result<Box<dyn QuestionGenerator>> {
    match config {
        ProviderConfig::OpenAI { api_key, base_url } => {
            if api_key.trim().is_empty() {
                anyhow::bail!("provider '{name}' has no API key configured");
            }
            Ok(Box::new(OpenAiGenerator::new(
                name,
                api_key,
                base_url.clone(),
                settings,
            )?))
        }
        ProviderConfig::Ollama { base_url } => {
            Ok(Box::new(OllamaGenerator::new(base_url, settings)?))
        }
        ProviderConfig::Mock => Ok(Box::new(MockGenerator::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_EXAMPAPER_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_EXAMPAPER_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_EXAMPAPER_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_EXAMPAPER_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("no ${closing"), "no ${closing");
        std::env::remove_var("_EXAMPAPER_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = PaperConfig::default();
        assert_eq!(config.default_provider, "groq");
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.regeneration_rounds, 2);

        let engine = config.engine_config();
        assert_eq!(engine.retry_delay, Duration::from_millis(1000));
        assert!(engine.request_timeout.is_none());
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
default_provider = "openai"
default_model = "gpt-4.1-mini"
parallelism = 8
request_timeout_secs = 90
granularity = "roots"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.local]
type = "ollama"
base_url = "http://localhost:11434"

[providers.offline]
type = "mock"

[weights]
recency_coefficient = 3.0
frequent_threshold = 2

[planner.bucket_ratio]
frequent = 0.6
recent = 0.4
never_asked = 0.0

[difficulty_mix]
hard = 0.4

[verifier]
min_words = 10
forbidden_phrases = ["solution"]
"#;
        let config: PaperConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(matches!(
            config.providers.get("offline"),
            Some(ProviderConfig::Mock)
        ));
        assert_eq!(config.granularity, Granularity::Roots);
        assert_eq!(config.weights.frequent_threshold, 2);
        // unspecified fields keep their defaults
        assert_eq!(config.weights.frequency_coefficient, 1.0);
        assert_eq!(config.difficulty_mix.easy, 0.3);
        assert_eq!(config.difficulty_mix.hard, 0.4);
        assert_eq!(config.verifier.min_words, Some(10));

        let engine = config.engine_config();
        assert_eq!(engine.parallelism, 8);
        assert_eq!(engine.request_timeout, Some(Duration::from_secs(90)));
        assert_eq!(engine.planner.bucket_ratio.never_asked, 0.0);
    }

    #[test]
    fn key_overrides_create_providers() {
        let mut config = PaperConfig::default();
        config.apply_key_overrides(|name| match name {
            "EXAMPAPER_GROQ_KEY" => Some("gsk-test".into()),
            _ => None,
        });
        match config.providers.get("groq") {
            Some(ProviderConfig::OpenAI { api_key, base_url }) => {
                assert_eq!(api_key, "gsk-test");
                assert_eq!(base_url.as_deref(), Some(GROQ_BASE_URL));
            }
            other => panic!("unexpected groq config: {other:?}"),
        }
        assert!(!config.providers.contains_key("openai"));
    }

    #[test]
    fn key_override_replaces_configured_key() {
        let mut config: PaperConfig = toml::from_str(
            r#"
[providers.openai]
type = "openai"
api_key = "from-file"
base_url = "https://proxy.example.com"
"#,
        )
        .unwrap();
        config.apply_key_overrides(|name| {
            (name == "EXAMPAPER_OPENAI_KEY").then(|| "from-env".to_string())
        });
        match config.providers.get("openai") {
            Some(ProviderConfig::OpenAI { api_key, base_url }) => {
                assert_eq!(api_key, "from-env");
                assert_eq!(base_url.as_deref(), Some("https://proxy.example.com"));
            }
            other => panic!("unexpected openai config: {other:?}"),
        }
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::OpenAI {
            api_key: "sk-secret".into(),
            base_url: None,
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn provider_lookup() {
        let config = PaperConfig::default();
        assert!(matches!(config.provider("mock"), Ok(ProviderConfig::Mock)));
        assert!(matches!(
            config.provider("ollama"),
            Ok(ProviderConfig::Ollama { .. })
        ));
        let err = config.provider("azure").unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exampaper.toml");
        std::fs::write(
            &path,
            "default_provider = \"mock\"\n[providers.local]\ntype = \"ollama\"\nbase_url = \"http://${_EXAMPAPER_HOST_VAR}:11434\"\n",
        )
        .unwrap();
        std::env::set_var("_EXAMPAPER_HOST_VAR", "gpu-box");

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_provider, "mock");
        match config.providers.get("local") {
            Some(ProviderConfig::Ollama { base_url }) => {
                assert_eq!(base_url, "http://gpu-box:11434")
            }
            other => panic!("unexpected local config: {other:?}"),
        }
        std::env::remove_var("_EXAMPAPER_HOST_VAR");

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn create_generator_requires_key() {
        let config = ProviderConfig::OpenAI {
            api_key: "  ".into(),
            base_url: None,
        };
        let err = create_generator("openai", &config, GenerationSettings::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("no API key"));

        let mock = create_generator("mock", &ProviderConfig::Mock, GenerationSettings::default())
            .unwrap();
        assert_eq!(mock.name(), "mock");
    }
}

//! Configuration for semantic slide conversion.
//!
//! All conversion behaviour is controlled through [`SemanticConfig`], built
//! via its [`SemanticConfigBuilder`]. The config is constructed once, wrapped
//! in an `Arc`, and handed to the gateway, the prompt builder and the batch
//! coordinator. Nothing in the pipeline reads model settings from anywhere
//! else.

use crate::error::SlidesError;
use crate::pipeline::gateway::ModelBackend;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Model id used when none is requested, and the fallback after a
/// `ModelNotFound`.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for semantic slide conversion.
///
/// # Example
/// ```rust
/// use edgequake_slides::SemanticConfig;
///
/// let config = SemanticConfig::builder()
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(60)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_model(), "gpt-4.1-mini");
/// ```
#[derive(Clone)]
pub struct SemanticConfig {
    /// Model id requested for each conversion. If None, `default_model` is used.
    pub model: Option<String>,

    /// Configured default model id. Default: [`DEFAULT_MODEL`].
    ///
    /// When the requested model is reported as not found, the orchestrator
    /// retries the slide once with this id instead of failing outright.
    pub default_model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `backend`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed model backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn ModelBackend>>,

    /// Optional allow-list of model ids. A request for an id outside the
    /// list fails with `ModelNotFound` without contacting the backend.
    pub known_models: Option<Vec<String>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the slide; the output is a
    /// restructuring of existing text, not new writing.
    pub temperature: f32,

    /// Maximum tokens the model may generate per slide. Default: 8192.
    ///
    /// Structured JSON is more verbose than Markdown; dense slides with
    /// tables or nested diagrams regularly exceed 4 000 tokens.
    pub max_tokens: usize,

    /// Per-model-call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// Number of batch workers. Default: 1.
    ///
    /// One worker means exactly one conversion in flight, which keeps load on
    /// the model provider flat and progress in strict input order. Raise it
    /// when the provider's rate limits allow.
    pub concurrency: usize,

    /// Custom instructional prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Maximum characters of slide text sent to the embedding backend. Default: 8000.
    pub embedding_char_budget: usize,

    /// Optional batch progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model: None,
            default_model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            backend: None,
            known_models: None,
            temperature: 0.1,
            max_tokens: 8192,
            api_timeout_secs: 90,
            concurrency: 1,
            system_prompt: None,
            embedding_char_budget: 8000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SemanticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticConfig")
            .field("model", &self.model)
            .field("default_model", &self.default_model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("known_models", &self.known_models)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("embedding_char_budget", &self.embedding_char_budget)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl SemanticConfig {
    /// Create a new builder for `SemanticConfig`.
    pub fn builder() -> SemanticConfigBuilder {
        SemanticConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model id a conversion will request first.
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.default_model)
    }
}

/// Builder for [`SemanticConfig`].
#[derive(Debug)]
pub struct SemanticConfigBuilder {
    config: SemanticConfig,
}

impl SemanticConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn known_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.known_models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn embedding_char_budget(mut self, chars: usize) -> Self {
        self.config.embedding_char_budget = chars;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SemanticConfig, SlidesError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(SlidesError::InvalidConfig(
                "API timeout must be at least 1 second".into(),
            ));
        }
        if c.default_model.trim().is_empty() {
            return Err(SlidesError::InvalidConfig(
                "Default model id must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(SlidesError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.embedding_char_budget == 0 {
            return Err(SlidesError::InvalidConfig(
                "Embedding character budget must be ≥ 1".into(),
            ));
        }
        if let Some(ref known) = c.known_models {
            if !known.iter().any(|m| m == &c.default_model) {
                return Err(SlidesError::InvalidConfig(format!(
                    "Default model '{}' is not in the known model list",
                    c.default_model
                )));
            }
        }
        Ok(self.config)
    }
}

//! Model gateway: one bounded call from screenshot + prompt to raw text.
//!
//! The rest of the crate sees only [`ModelBackend`] and [`GatewayError`].
//! Provider request/response shapes stay behind the trait, so tests drive
//! the full pipeline with a scripted backend and production wires in
//! [`EdgequakeBackend`].
//!
//! ## Retry policy
//!
//! There is none here. A timed-out or failed call is reported once; the
//! orchestrator decides whether to fall back to the default model and the
//! batch caller decides whether to re-run failed slides.

use crate::config::SemanticConfig;
use crate::error::GatewayError;
use crate::pipeline::encode::encode_screenshot;
use crate::pipeline::input::Screenshot;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// A vision-capable model that turns an image plus prompt into free text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short identifier used in logs and `Debug` output.
    fn name(&self) -> &str;

    /// Run one completion. Implementations must not retry internally.
    async fn complete(
        &self,
        image: &Screenshot,
        prompt: &str,
        model: &str,
    ) -> Result<String, GatewayError>;
}

/// Timeout and model-id guard around a [`ModelBackend`].
#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
    known_models: Option<Vec<String>>,
}

impl Gateway {
    /// Gateway using the timeout and model allow-list from `config`.
    pub fn new(backend: Arc<dyn ModelBackend>, config: &SemanticConfig) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(config.api_timeout_secs),
            known_models: config.known_models.clone(),
        }
    }

    /// Gateway with an explicit timeout and no model allow-list.
    pub fn with_timeout(backend: Arc<dyn ModelBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            known_models: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Send one screenshot and prompt to `model_id`, bounded by the timeout.
    pub async fn convert(
        &self,
        image: &Screenshot,
        prompt: &str,
        model_id: &str,
    ) -> Result<String, GatewayError> {
        if let Some(ref known) = self.known_models {
            if !known.iter().any(|m| m == model_id) {
                return Err(GatewayError::ModelNotFound(model_id.to_string()));
            }
        }

        let start = Instant::now();
        let text = tokio::time::timeout(
            self.timeout,
            self.backend.complete(image, prompt, model_id),
        )
        .await
        .map_err(|_| GatewayError::Timeout {
            operation: "model call".into(),
            secs: self.timeout.as_secs(),
        })??;

        debug!(
            "{} / {}: {} prompt chars → {} response chars in {:?}",
            self.backend.name(),
            model_id,
            prompt.len(),
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }
}

/// [`ModelBackend`] backed by an `edgequake-llm` provider.
///
/// Named providers are instantiated per model id on first use and cached.
/// An auto-detected provider is fixed to the model it was created with.
pub struct EdgequakeBackend {
    label: String,
    provider_name: Option<String>,
    fixed: Option<Arc<dyn LLMProvider>>,
    cache: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
    temperature: f32,
    max_tokens: usize,
}

impl EdgequakeBackend {
    /// Backend for a named provider (`"openai"`, `"anthropic"`, `"gemini"` …).
    ///
    /// The provider for `initial_model` is created eagerly so that missing
    /// credentials surface before any slide is processed.
    pub fn named(
        provider_name: &str,
        initial_model: &str,
        config: &SemanticConfig,
    ) -> Result<Self, GatewayError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, initial_model)
            .map_err(|e| GatewayError::NotConfigured(format!("{provider_name}: {e}")))?;
        let mut cache = HashMap::new();
        cache.insert(initial_model.to_string(), provider);
        Ok(Self {
            label: provider_name.to_string(),
            provider_name: Some(provider_name.to_string()),
            fixed: None,
            cache: Mutex::new(cache),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Backend around an already-constructed provider.
    pub fn from_provider(provider: Arc<dyn LLMProvider>, config: &SemanticConfig) -> Self {
        Self {
            label: "auto".to_string(),
            provider_name: None,
            fixed: Some(provider),
            cache: Mutex::new(HashMap::new()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, GatewayError> {
        if let Some(ref p) = self.fixed {
            return Ok(Arc::clone(p));
        }
        let name = self.provider_name.as_deref().unwrap_or("openai");
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| GatewayError::Network("provider cache poisoned".into()))?;
        if let Some(p) = cache.get(model) {
            return Ok(Arc::clone(p));
        }
        let provider = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| GatewayError::from_backend_message(model, &e.to_string()))?;
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ModelBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(
        &self,
        image: &Screenshot,
        prompt: &str,
        model: &str,
    ) -> Result<String, GatewayError> {
        let provider = self.provider_for(model)?;
        let messages = vec![ChatMessage::user_with_images(
            prompt,
            vec![encode_screenshot(image)],
        )];

        let response = provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| GatewayError::from_backend_message(model, &e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Echo;

    #[async_trait]
    impl ModelBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            _image: &Screenshot,
            prompt: &str,
            model: &str,
        ) -> Result<String, GatewayError> {
            Ok(format!("{model}:{prompt}"))
        }
    }

    struct Slow;

    #[async_trait]
    impl ModelBackend for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _image: &Screenshot,
            _prompt: &str,
            _model: &str,
        ) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    fn shot() -> Screenshot {
        Screenshot::new(vec![0u8; 4], "image/png")
    }

    #[tokio::test]
    async fn passes_through_backend_text() {
        let gw = Gateway::with_timeout(Arc::new(Echo), Duration::from_secs(5));
        assert_eq!(gw.convert(&shot(), "hi", "m1").await.unwrap(), "m1:hi");
        assert_eq!(gw.backend_name(), "echo");
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let gw = Gateway::with_timeout(Arc::new(Slow), Duration::from_millis(50));
        let err = gw.convert(&shot(), "hi", "m1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_model_fails_without_calling_backend() {
        let config = SemanticConfig::builder()
            .known_models(["gpt-4.1-nano", "gpt-4.1-mini"])
            .build()
            .unwrap();
        let gw = Gateway::new(Arc::new(Slow), &config);
        let err = gw.convert(&shot(), "hi", "gpt-9").await.unwrap_err();
        assert_eq!(err, GatewayError::ModelNotFound("gpt-9".into()));
    }
}

//! Single-slide conversion: screenshot + extraction → [`SemanticResult`].
//!
//! ## Degrade, don't abort
//!
//! A model answer with some invalid blocks still yields a result; the
//! dropped blocks are listed in [`SemanticResult::warnings`]. Only an answer
//! with no valid block at all fails, with
//! [`ErrorKind::EmptyResult`](crate::error::ErrorKind::EmptyResult). A
//! partially structured slide is more useful to a reviewer than nothing.
//!
//! Every failure inside the pipeline (gateway, parser, validation, missing
//! screenshot) is folded into one [`ConversionError`] here, so batch code
//! never needs to know which stage failed.

use crate::config::SemanticConfig;
use crate::error::{ConversionError, GatewayError, SlidesError};
use crate::pipeline::gateway::{EdgequakeBackend, Gateway, ModelBackend};
use crate::pipeline::input::Screenshot;
use crate::pipeline::parse::parse_response;
use crate::prompts::build_prompt;
use crate::slide::{SemanticResult, SlideExtraction};
use edgequake_llm::ProviderFactory;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the per-slide pipeline: prompt → gateway → parse → validate.
#[derive(Clone)]
pub struct SlideConverter {
    gateway: Gateway,
    config: Arc<SemanticConfig>,
}

impl SlideConverter {
    /// Build a converter, resolving the model backend from `config`.
    ///
    /// # Errors
    /// [`SlidesError::ProviderNotConfigured`] when no backend can be found.
    pub fn new(config: Arc<SemanticConfig>) -> Result<Self, SlidesError> {
        let backend = resolve_backend(&config)?;
        Ok(Self::with_backend(backend, config))
    }

    pub fn with_backend(backend: Arc<dyn ModelBackend>, config: Arc<SemanticConfig>) -> Self {
        let gateway = Gateway::new(backend, &config);
        Self { gateway, config }
    }

    /// Use a pre-built gateway (custom timeout etc.).
    pub fn from_parts(gateway: Gateway, config: Arc<SemanticConfig>) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// The exact prompt [`convert_slide`](Self::convert_slide) would send.
    pub fn prompt_for(&self, slide: &SlideExtraction) -> String {
        build_prompt(
            slide,
            &slide.image_inventory(),
            self.config.system_prompt.as_deref(),
        )
    }

    /// Convert one slide.
    ///
    /// `screenshot == None` fails with `MissingScreenshot`
    /// before anything is sent to the model.
    pub async fn convert_slide(
        &self,
        slide: &SlideExtraction,
        screenshot: Option<&Screenshot>,
    ) -> Result<SemanticResult, ConversionError> {
        let start = Instant::now();
        let shot = screenshot.ok_or_else(|| ConversionError::missing_screenshot(slide.ordinal))?;

        let prompt = self.prompt_for(slide);
        debug!(
            "Slide {}: prompt {} chars, screenshot {} bytes",
            slide.ordinal,
            prompt.len(),
            shot.len()
        );

        let raw = self.call_with_fallback(slide.ordinal, shot, &prompt).await?;
        let result = parse_response(&raw)?;

        if result.blocks.is_empty() {
            return Err(ConversionError::empty_result(result.dropped_blocks()));
        }
        if result.dropped_blocks() > 0 {
            warn!(
                "Slide {}: kept {} blocks, dropped {}",
                slide.ordinal,
                result.blocks.len(),
                result.dropped_blocks()
            );
        }

        info!(
            "Slide {}: {} ({} blocks) in {:?}",
            slide.ordinal,
            result.classification,
            result.blocks.len(),
            start.elapsed()
        );
        Ok(result)
    }

    /// Call the gateway, retrying once with the default model when the
    /// requested one does not exist.
    async fn call_with_fallback(
        &self,
        ordinal: usize,
        shot: &Screenshot,
        prompt: &str,
    ) -> Result<String, GatewayError> {
        let requested = self.config.effective_model();
        match self.gateway.convert(shot, prompt, requested).await {
            Err(GatewayError::ModelNotFound(missing)) if missing != self.config.default_model => {
                warn!(
                    "Slide {}: model '{}' not found, falling back to '{}'",
                    ordinal, missing, self.config.default_model
                );
                self.gateway
                    .convert(shot, prompt, &self.config.default_model)
                    .await
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for SlideConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideConverter")
            .field("backend", &self.gateway.backend_name())
            .field("timeout", &self.gateway.timeout())
            .field("model", &self.config.effective_model())
            .finish()
    }
}

/// Resolve the model backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with the effective model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
///    honoured only when both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present, so users holding several
///    keys get a predictable default.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_backend(config: &SemanticConfig) -> Result<Arc<dyn ModelBackend>, SlidesError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(ref name) = config.provider_name {
        return named_backend(name, config.effective_model(), config);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return named_backend(&prov, &model, config);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return named_backend("openai", config.effective_model(), config);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SlidesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(EdgequakeBackend::from_provider(llm_provider, config)))
}

fn named_backend(
    name: &str,
    model: &str,
    config: &SemanticConfig,
) -> Result<Arc<dyn ModelBackend>, SlidesError> {
    let backend = EdgequakeBackend::named(name, model, config).map_err(|e| {
        SlidesError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: e.to_string(),
        }
    })?;
    Ok(Arc::new(backend))
}

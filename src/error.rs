//! Error types for the edgequake-slides library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SlidesError`] is **fatal**: nothing can be converted at all (bad
//!   configuration, provider not configured, unreadable deck). Returned as
//!   `Err(SlidesError)` from top-level entry points.
//!
//! * [`ConversionError`] is **non-fatal**: one slide failed (timeout, garbled
//!   model output, no screenshot) but every other slide is fine. Stored on
//!   the batch item so the reviewer sees which slides need attention.
//!
//! [`GatewayError`] is the narrower vocabulary of the model boundary; it
//! folds into a [`ConversionError`] through `From`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-slides library.
#[derive(Debug, Error)]
pub enum SlidesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Deck file was not found at the given path.
    #[error("Deck file not found: '{path}'\nCheck the path exists and is readable.")]
    DeckNotFound { path: PathBuf },

    /// Deck file exists but is not a valid deck document.
    #[error("Deck file '{path}' is malformed: {detail}")]
    MalformedDeck { path: PathBuf, detail: String },

    /// A slide id was requested that the store does not hold.
    #[error("Slide '{id}' not found in store")]
    SlideNotFound { id: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy for a single slide conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport-level failure talking to the model.
    Network,
    /// The model call exceeded its time bound.
    Timeout,
    /// The requested model id does not exist on the backend.
    ModelNotFound,
    /// The model answered with something that is not a structured result.
    UnparsableResponse,
    /// Every block the model produced was invalid.
    EmptyResult,
    /// No screenshot is available for the slide.
    MissingScreenshot,
    /// The backend rejected the call for quota / rate reasons (HTTP 429).
    RateLimited,
    /// Credentials are missing or rejected (HTTP 401/403).
    ProviderNotConfigured,
}

impl ErrorKind {
    /// Whether re-running the same item unchanged can plausibly succeed.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::UnparsableResponse
            | ErrorKind::EmptyResult
            | ErrorKind::RateLimited => true,
            ErrorKind::ModelNotFound
            | ErrorKind::MissingScreenshot
            | ErrorKind::ProviderNotConfigured => false,
        }
    }

    /// Short label used when bucketing failures for display.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Network => "network error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ModelNotFound => "model not found",
            ErrorKind::UnparsableResponse => "unparsable response",
            ErrorKind::EmptyResult => "empty result",
            ErrorKind::MissingScreenshot => "no screenshot",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::ProviderNotConfigured => "provider not configured",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A non-fatal error for a single slide.
///
/// Every failure inside the per-slide pipeline (gateway, parser, block
/// validation, missing screenshot) ends up here, so batch code handles one
/// shape regardless of where the slide went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ConversionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConversionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_screenshot(ordinal: usize) -> Self {
        Self::new(
            ErrorKind::MissingScreenshot,
            format!("No screenshot available for slide {ordinal}"),
        )
    }

    pub fn empty_result(dropped: usize) -> Self {
        Self::new(
            ErrorKind::EmptyResult,
            format!("Model produced no valid blocks ({dropped} dropped as invalid)"),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors at the model boundary.
///
/// Backend-specific failures are classified into these variants before they
/// leave the gateway; no provider error type crosses it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model '{0}' not found or not supported by the backend")]
    ModelNotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::Network(_) => ErrorKind::Network,
            GatewayError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            GatewayError::RateLimited(_) => ErrorKind::RateLimited,
            GatewayError::NotConfigured(_) => ErrorKind::ProviderNotConfigured,
        }
    }

    /// Classify a free-form backend error message.
    ///
    /// Providers report the same conditions with different wording and
    /// status codes; this keeps the mapping in one place.
    pub fn from_backend_message(model: &str, message: &str) -> Self {
        let lower = message.to_lowercase();
        let mentions_model = lower.contains("model");
        if mentions_model
            && (lower.contains("not found")
                || lower.contains("not_found")
                || lower.contains("does not exist")
                || lower.contains("unknown model")
                || lower.contains("not supported")
                || lower.contains("404"))
        {
            return GatewayError::ModelNotFound(model.to_string());
        }
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("quota")
            || lower.contains("resource_exhausted")
        {
            return GatewayError::RateLimited(message.to_string());
        }
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("invalid api key")
            || lower.contains("api key not")
            || lower.contains("authentication")
        {
            return GatewayError::NotConfigured(message.to_string());
        }
        GatewayError::Network(message.to_string())
    }
}

impl From<GatewayError> for ConversionError {
    fn from(e: GatewayError) -> Self {
        ConversionError::new(e.kind(), e.to_string())
    }
}

//! Gemini `embedContent` backend.
//!
//! Gemini distinguishes retrieval documents from retrieval queries, so the
//! [`EmbeddingTask`] hint is forwarded as `taskType`.

use super::{EmbeddingBackend, EmbeddingError, EmbeddingTask};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    output_dimensionality: Option<u32>,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured("missing Gemini API key".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| EmbeddingError::NotConfigured("invalid Gemini API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: model.into(),
            output_dimensionality: None,
        })
    }

    /// Configure from `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) and
    /// `GEMINI_EMBEDDING_MODEL`.
    pub fn from_env(timeout: Duration) -> Result<Self, EmbeddingError> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| EmbeddingError::NotConfigured("GEMINI_API_KEY is not set".into()))?;
        let model = std::env::var("GEMINI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_EMBEDDING_MODEL.to_string());
        Self::new(&key, model, timeout)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_output_dimensionality(mut self, dims: u32) -> Self {
        self.output_dimensionality = Some(dims);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:embedContent", self.base_url, self.model)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedContentRequest::new(&self.model, text, task, self.output_dimensionality);
        let resp = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedContentResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        if parsed.embedding.values.is_empty() {
            return Err(EmbeddingError::Malformed("empty embedding".into()));
        }
        Ok(parsed.embedding.values)
    }
}

fn task_type(task: EmbeddingTask) -> &'static str {
    match task {
        EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
        EmbeddingTask::Query => "RETRIEVAL_QUERY",
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

impl<'a> EmbedContentRequest<'a> {
    fn new(model: &str, text: &'a str, task: EmbeddingTask, dims: Option<u32>) -> Self {
        Self {
            model: format!("models/{model}"),
            content: Content {
                parts: vec![Part { text }],
            },
            task_type: task_type(task),
            output_dimensionality: dims,
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

//! OpenAI-compatible `/embeddings` backend.

use super::{EmbeddingBackend, EmbeddingError, EmbeddingTask};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Embeddings client for OpenAI and API-compatible servers.
///
/// The task hint is ignored; OpenAI models embed documents and queries the
/// same way.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured("missing OpenAI API key".into()));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingError::NotConfigured("missing embedding model name".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::NotConfigured("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }

    /// Configure from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `OPENAI_EMBEDDING_MODEL`.
    pub fn from_env(timeout: Duration) -> Result<Self, EmbeddingError> {
        let key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EmbeddingError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
        let base = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());
        let model = std::env::var("OPENAI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string());
        Self::new(&key, &base, model, None, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError> {
        let inputs = [text];
        let request = EmbeddingRequest {
            model: &self.model,
            input: &inputs,
            dimensions: self.dimensions,
        };
        let resp = self
            .client
            .post(&self.endpoint)
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

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        first_embedding(parsed)
    }
}

fn first_embedding(mut parsed: EmbeddingResponse) -> Result<Vec<f32>, EmbeddingError> {
    parsed.data.sort_by_key(|entry| entry.index);
    parsed
        .data
        .into_iter()
        .next()
        .map(|entry| entry.embedding)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EmbeddingError::Malformed("no embedding in response".into()))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let inputs = ["hello"];
        let req = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &inputs,
            dimensions: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-3-small", "input": ["hello"]})
        );
    }

    #[test]
    fn response_picks_lowest_index() {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [{"embedding": [2.0], "index": 1}, {"embedding": [1.0, 0.5], "index": 0}]}"#,
        )
        .unwrap();
        assert_eq!(first_embedding(parsed).unwrap(), vec![1.0, 0.5]);
    }

    #[test]
    fn empty_response_is_malformed() {
        let parsed: EmbeddingResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(matches!(first_embedding(parsed), Err(EmbeddingError::Malformed(_))));
    }

    #[test]
    fn blank_key_is_rejected() {
        let err = OpenAiEmbedder::new(" ", DEFAULT_OPENAI_BASE_URL, "m", None, Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, EmbeddingError::NotConfigured(_)));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let e = OpenAiEmbedder::new("k", "http://localhost:8080/v1/", "m", None, Duration::from_secs(5))
            .unwrap();
        assert_eq!(e.endpoint(), "http://localhost:8080/v1/embeddings");
    }
}

//! Embedding similarity index for "find similar slides".
//!
//! Slide text (title, notes and extracted block text, cut to a character
//! budget) is embedded through an [`EmbeddingBackend`]. Vectors are cached
//! per slide together with a blake3 hash of the text that produced them; when
//! the text changes the hash no longer matches and the vector is regenerated
//! on next use. Records are replaced whole, never patched.
//!
//! The index has no ordering dependency on the batch coordinator. Concurrent
//! queries are safe; two queries racing on a stale slide may both embed it,
//! and the later write wins with an identical record.

pub mod gemini;
pub mod openai;

use crate::config::SemanticConfig;
use crate::slide::SlideExtraction;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use gemini::GeminiEmbedder;
pub use openai::OpenAiEmbedder;

/// Hint telling the backend how the text will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// Slide text stored in the index.
    Document,
    /// Free-text search input.
    Query,
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding backend not configured: {0}")]
    NotConfigured(String),

    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Embedding backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    #[error("Slide '{0}' is not in the similarity index")]
    UnknownSlide(String),
}

/// A model that maps text to a fixed-length vector.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError>;
}

/// `dot(a, b) / (‖a‖·‖b‖)`, accumulated in f64.
///
/// Returns 0.0 for empty vectors, vectors of different length, or a
/// zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Text embedded for a slide: title, notes and block text, cut to
/// `char_budget` characters.
pub fn embedding_text(slide: &SlideExtraction, char_budget: usize) -> String {
    let parts = [
        slide.title.trim().to_string(),
        slide.notes.trim().to_string(),
        slide.extracted_text(),
    ];
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    joined.chars().take(char_budget).collect()
}

/// Hex blake3 digest of the embedded text.
pub fn text_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// A cached slide vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub slide_id: String,
    pub ordinal: usize,
    pub vector: Vec<f32>,
    /// [`text_hash`] of the text the vector was computed from.
    pub text_hash: String,
}

/// Serialized vectors for one embedding model, written next to a deck so a
/// later process can skip unchanged slides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingCache {
    /// [`EmbeddingBackend::name`] of the model that produced the vectors.
    pub model: String,
    pub records: Vec<EmbeddingRecord>,
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarSlide {
    pub slide_id: String,
    pub ordinal: usize,
    pub score: f32,
}

/// Counts from [`SimilarityIndex::index_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub embedded: usize,
    pub cached: usize,
    pub failed: usize,
}

const DEFAULT_QUERY_CONCURRENCY: usize = 4;

/// Slide corpus plus lazily computed embeddings.
pub struct SimilarityIndex {
    backend: Arc<dyn EmbeddingBackend>,
    char_budget: usize,
    concurrency: usize,
    slides: RwLock<HashMap<String, SlideExtraction>>,
    records: RwLock<HashMap<String, Arc<EmbeddingRecord>>>,
}

impl SimilarityIndex {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, char_budget: usize) -> Self {
        Self {
            backend,
            char_budget: char_budget.max(1),
            concurrency: DEFAULT_QUERY_CONCURRENCY,
            slides: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(backend: Arc<dyn EmbeddingBackend>, config: &SemanticConfig) -> Self {
        Self::new(backend, config.embedding_char_budget)
    }

    /// Embedding requests in flight while a query brings candidates up to
    /// date. Default: 4.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Add or replace slides. Cached vectors are kept; a changed text is
    /// detected by hash on next use.
    pub fn upsert_slides(&self, slides: impl IntoIterator<Item = SlideExtraction>) {
        let mut map = self.slides.write().unwrap_or_else(|e| e.into_inner());
        for slide in slides {
            map.insert(slide.id.clone(), slide);
        }
    }

    pub fn remove_slide(&self, id: &str) {
        self.slides
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.slides.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached record for `id`, fresh or stale.
    pub fn record(&self, id: &str) -> Option<Arc<EmbeddingRecord>> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Records of the current slides, for persisting between processes.
    pub fn export_cache(&self) -> EmbeddingCache {
        let slides = self.slides.read().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<EmbeddingRecord> = self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|r| slides.contains_key(&r.slide_id))
            .map(|r| r.as_ref().clone())
            .collect();
        records.sort_by_key(|r| r.ordinal);
        EmbeddingCache {
            model: self.backend.name().to_string(),
            records,
        }
    }

    /// Seed the record map from a cache written by [`export_cache`](Self::export_cache).
    ///
    /// A cache from another model is ignored. Records whose hash no longer
    /// matches the slide text are re-embedded on next use. Returns how many
    /// records were loaded.
    pub fn import_cache(&self, cache: EmbeddingCache) -> usize {
        if cache.model != self.backend.name() {
            debug!(
                "Embedding cache is for '{}', backend is '{}'; ignored",
                cache.model,
                self.backend.name()
            );
            return 0;
        }
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let n = cache.records.len();
        for record in cache.records {
            records.insert(record.slide_id.clone(), Arc::new(record));
        }
        n
    }

    fn slide(&self, id: &str) -> Option<SlideExtraction> {
        self.slides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Return a record matching the slide's current text, embedding it when
    /// missing or stale.
    pub async fn ensure_embedded(&self, id: &str) -> Result<Arc<EmbeddingRecord>, EmbeddingError> {
        self.ensure_embedded_inner(id).await.map(|(record, _)| record)
    }

    /// Same as [`ensure_embedded`](Self::ensure_embedded); the flag reports
    /// whether the backend was called.
    async fn ensure_embedded_inner(
        &self,
        id: &str,
    ) -> Result<(Arc<EmbeddingRecord>, bool), EmbeddingError> {
        let slide = self
            .slide(id)
            .ok_or_else(|| EmbeddingError::UnknownSlide(id.to_string()))?;
        let text = embedding_text(&slide, self.char_budget);
        let hash = text_hash(&text);

        if let Some(existing) = self.record(id) {
            if existing.text_hash == hash {
                return Ok((existing, false));
            }
            debug!("Slide '{}': text changed, re-embedding", id);
        }

        let vector = self.backend.embed(&text, EmbeddingTask::Document).await?;
        let record = Arc::new(EmbeddingRecord {
            slide_id: slide.id.clone(),
            ordinal: slide.ordinal,
            vector,
            text_hash: hash,
        });
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slide.id, Arc::clone(&record));
        Ok((record, true))
    }

    /// Embed every slide that has no fresh record, `concurrency` at a time.
    ///
    /// Individual failures are logged and counted, not returned.
    pub async fn index_all(&self, concurrency: usize) -> IndexStats {
        let ids: Vec<String> = self
            .slides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();

        let outcomes: Vec<_> = stream::iter(ids.iter().map(|id| async move {
            (id, self.ensure_embedded_inner(id).await)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

        let mut stats = IndexStats::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok((_, true)) => stats.embedded += 1,
                Ok((_, false)) => stats.cached += 1,
                Err(e) => {
                    warn!("Slide '{}': embedding failed: {}", id, e);
                    stats.failed += 1;
                }
            }
        }
        info!(
            "Indexed {} slides via {} ({} embedded, {} cached, {} failed)",
            ids.len(),
            self.backend.name(),
            stats.embedded,
            stats.cached,
            stats.failed
        );
        stats
    }

    /// Top-`k` slides most similar to `target_id`.
    ///
    /// The target is embedded if needed. Every other slide in the index is a
    /// candidate; missing or stale vectors are embedded first and a slide
    /// whose embedding fails is left out. Ordered by descending score, ties
    /// by ordinal ascending.
    pub async fn find_similar(
        &self,
        target_id: &str,
        k: usize,
    ) -> Result<Vec<SimilarSlide>, EmbeddingError> {
        let target = self.ensure_embedded(target_id).await?;
        let candidates = self.fresh_records(Some(target_id)).await;
        Ok(rank(&target.vector, candidates.iter().map(Arc::as_ref), k))
    }

    /// Top-`k` slides for a free-text query.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SimilarSlide>, EmbeddingError> {
        let text: String = query.chars().take(self.char_budget).collect();
        let vector = self.backend.embed(&text, EmbeddingTask::Query).await?;
        let candidates = self.fresh_records(None).await;
        Ok(rank(&vector, candidates.iter().map(Arc::as_ref), k))
    }

    /// Up-to-date records for every slide except `exclude`.
    async fn fresh_records(&self, exclude: Option<&str>) -> Vec<Arc<EmbeddingRecord>> {
        let ids: Vec<String> = self
            .slides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|id| Some(id.as_str()) != exclude)
            .cloned()
            .collect();

        stream::iter(ids.iter().map(|id| async move {
            match self.ensure_embedded(id).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Slide '{}': embedding failed, left out: {}", id, e);
                    None
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .filter_map(|record| async move { record })
        .collect()
        .await
    }
}

fn rank<'a>(
    target: &[f32],
    candidates: impl Iterator<Item = &'a EmbeddingRecord>,
    k: usize,
) -> Vec<SimilarSlide> {
    let mut scored: Vec<SimilarSlide> = candidates
        .filter(|r| {
            if r.vector.len() != target.len() {
                warn!(
                    "Slide '{}': dimension {} != {}, skipped",
                    r.slide_id,
                    r.vector.len(),
                    target.len()
                );
                return false;
            }
            true
        })
        .map(|r| SimilarSlide {
            slide_id: r.slide_id.clone(),
            ordinal: r.ordinal,
            score: cosine_similarity(target, &r.vector),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.ordinal.cmp(&b.ordinal))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_identity_and_opposite() {
        let v = [0.3f32, -1.7, 2.2, 0.01];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert_eq!(cosine_similarity(&v, &v), 1.0);
        assert_eq!(cosine_similarity(&v, &neg), -1.0);
    }

    #[test]
    fn embedding_text_respects_budget_in_chars() {
        let slide = SlideExtraction {
            id: "x".into(),
            ordinal: 1,
            title: "Žluťoučký kůň".into(),
            layout: String::new(),
            notes: "poznámky".into(),
            content: vec![],
        };
        let text = embedding_text(&slide, 5);
        assert_eq!(text, "Žluťo");
        assert_eq!(embedding_text(&slide, 1000), "Žluťoučký kůň\npoznámky");
    }

    #[test]
    fn hash_changes_with_text() {
        assert_eq!(text_hash("a"), text_hash("a"));
        assert_ne!(text_hash("a"), text_hash("b"));
        assert_eq!(text_hash("a").len(), 64);
    }

    #[test]
    fn rank_orders_by_score_then_ordinal() {
        let rec = |id: &str, ordinal, vector: Vec<f32>| EmbeddingRecord {
            slide_id: id.into(),
            ordinal,
            vector,
            text_hash: String::new(),
        };
        let records = [
            rec("c", 3, vec![1.0, 0.0]),
            rec("a", 1, vec![1.0, 0.0]),
            rec("b", 2, vec![0.0, 1.0]),
            rec("bad", 4, vec![1.0]),
        ];
        let ranked = rank(&[1.0, 0.0], records.iter(), 10);
        let ids: Vec<_> = ranked.iter().map(|s| s.slide_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(rank(&[1.0, 0.0], records.iter(), 1).len(), 1);
    }
}

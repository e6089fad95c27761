//! Slide store: where extractions come from and accepted results go.
//!
//! The store is an external collaborator; the conversion core only needs two
//! operations, captured by [`SlideStore`]. Two implementations ship here:
//!
//! * [`JsonDeckStore`], a deck document on disk, rewritten atomically
//!   (temp file + rename) on every accepted result.
//! * [`MemorySlideStore`], for tests and embedding callers.

use crate::blocks::ContentBlock;
use crate::error::SlidesError;
use crate::slide::{Classification, SemanticResult, SlideExtraction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors raised by a [`SlideStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Slide '{id}' not found in store")]
    NotFound { id: String },

    #[error("Failed to persist deck '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialise deck: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<StoreError> for SlidesError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id } => SlidesError::SlideNotFound { id },
            StoreError::Persist { path, source } => SlidesError::OutputWriteFailed { path, source },
            StoreError::Serialize(e) => SlidesError::Internal(e.to_string()),
        }
    }
}

/// Read access to extractions and write access for accepted results.
#[async_trait]
pub trait SlideStore: Send + Sync {
    async fn get_slide_extraction(&self, id: &str) -> Result<SlideExtraction, StoreError>;

    /// Merge an accepted result into the slide's persisted content.
    async fn apply_semantic_result(
        &self,
        id: &str,
        result: &SemanticResult,
    ) -> Result<(), StoreError>;
}

/// Metadata kept for a slide whose semantic result was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedConversion {
    pub summary: String,
    pub classification: Classification,
}

/// On-disk deck document.
///
/// ```json
/// {"id": "deck-1", "title": "Q3 review", "slides": [ { "id": "...", "ordinal": 1, ... } ]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub slides: Vec<SlideExtraction>,
    /// Accepted conversions keyed by slide id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub applied: BTreeMap<String, AppliedConversion>,
}

impl Deck {
    pub fn slide(&self, id: &str) -> Option<&SlideExtraction> {
        self.slides.iter().find(|s| s.id == id)
    }

    /// Replace a slide's content (and title, if the result carries one).
    fn apply(&mut self, id: &str, result: &SemanticResult) -> Result<(), StoreError> {
        let slide = self
            .slides
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        slide.content = result.blocks.clone();
        if let Some(ref title) = result.title {
            slide.title = title.clone();
        }
        self.applied.insert(
            id.to_string(),
            AppliedConversion {
                summary: result.summary.clone(),
                classification: result.classification,
            },
        );
        Ok(())
    }

    /// Slides in ordinal order.
    pub fn ordered(&self) -> Vec<SlideExtraction> {
        let mut slides = self.slides.clone();
        slides.sort_by_key(|s| s.ordinal);
        slides
    }
}

/// Deck persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonDeckStore {
    path: PathBuf,
    deck: RwLock<Deck>,
}

impl JsonDeckStore {
    /// Load a deck file, validating every block in every slide.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SlidesError> {
        let path = path.as_ref().to_path_buf();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SlidesError::DeckNotFound { path });
            }
            Err(source) => return Err(SlidesError::ReadFailed { path, source }),
        };
        let deck: Deck = serde_json::from_str(&text).map_err(|e| SlidesError::MalformedDeck {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        for slide in &deck.slides {
            if let Some(bad) = slide.content.iter().find_map(|b| b.validate().err()) {
                return Err(SlidesError::MalformedDeck {
                    path,
                    detail: format!("slide '{}': {}", slide.id, bad),
                });
            }
        }
        info!("Loaded deck '{}' ({} slides)", deck.id, deck.slides.len());
        Ok(Self {
            path,
            deck: RwLock::new(deck),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current deck.
    pub async fn deck(&self) -> Deck {
        self.deck.read().await.clone()
    }

    /// Write the deck via a temp file in the same directory, then rename.
    fn persist(&self, deck: &Deck) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(deck)?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let persist_err = |source| StoreError::Persist {
            path: self.path.clone(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(&json).map_err(persist_err)?;
        tmp.persist(&self.path).map_err(|e| persist_err(e.error))?;
        debug!("Persisted deck to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl SlideStore for JsonDeckStore {
    async fn get_slide_extraction(&self, id: &str) -> Result<SlideExtraction, StoreError> {
        self.deck
            .read()
            .await
            .slide(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn apply_semantic_result(
        &self,
        id: &str,
        result: &SemanticResult,
    ) -> Result<(), StoreError> {
        let mut guard = self.deck.write().await;
        let mut next = guard.clone();
        next.apply(id, result)?;
        self.persist(&next)?;
        *guard = next;
        info!("Applied semantic result to slide '{}'", id);
        Ok(())
    }
}

/// Store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemorySlideStore {
    slides: RwLock<HashMap<String, SlideExtraction>>,
    applied: RwLock<HashMap<String, SemanticResult>>,
}

impl MemorySlideStore {
    pub fn new(slides: impl IntoIterator<Item = SlideExtraction>) -> Self {
        Self {
            slides: RwLock::new(slides.into_iter().map(|s| (s.id.clone(), s)).collect()),
            applied: RwLock::new(HashMap::new()),
        }
    }

    /// The last result applied to `id`, if any.
    pub async fn applied(&self, id: &str) -> Option<SemanticResult> {
        self.applied.read().await.get(id).cloned()
    }

    pub async fn content(&self, id: &str) -> Option<Vec<ContentBlock>> {
        self.slides.read().await.get(id).map(|s| s.content.clone())
    }
}

#[async_trait]
impl SlideStore for MemorySlideStore {
    async fn get_slide_extraction(&self, id: &str) -> Result<SlideExtraction, StoreError> {
        self.slides
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn apply_semantic_result(
        &self,
        id: &str,
        result: &SemanticResult,
    ) -> Result<(), StoreError> {
        let mut slides = self.slides.write().await;
        let slide = slides
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        slide.content = result.blocks.clone();
        if let Some(ref title) = result.title {
            slide.title = title.clone();
        }
        self.applied
            .write()
            .await
            .insert(id.to_string(), result.clone());
        Ok(())
    }
}

//! # edgequake-slides
//!
//! Semantic conversion of presentation slides with Vision Language Models.
//!
//! ## Why this crate?
//!
//! Slide extractors recover text but not meaning: a two-column comparison
//! comes out as unrelated text boxes, a process diagram as a flat list of
//! smart-art nodes. This crate sends the slide screenshot together with that
//! rough extraction to a VLM and turns its answer into typed content blocks
//! (`comparison`, `sequence`, `definition`, …) that a renderer or editor can
//! work with directly. A reviewer then accepts or rejects each converted
//! slide before anything is written back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SlideExtraction + screenshot
//!  │
//!  ├─ 1. Prompt   raw extraction + image inventory + block catalog
//!  ├─ 2. Gateway  one timeout-bounded VLM call (gpt-4.1-nano / claude / gemini / …)
//!  ├─ 3. Parse    fence stripping, JSON recovery, per-block validation
//!  ├─ 4. Batch    worker pool, per-item failure isolation, progress
//!  └─ 5. Review   ready → accepted (applied to the store) | rejected
//! ```
//!
//! A separate [`embeddings`] module ranks slides by cosine similarity for
//! "find similar".
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_slides::{
//!     BatchCoordinator, BatchItem, DirectoryScreenshots, JsonDeckStore, ReviewSession,
//!     SemanticConfig, SlideConverter, SlidePipeline,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = Arc::new(SemanticConfig::default());
//!     let store = JsonDeckStore::open("deck.json").await?;
//!     let pipeline = SlidePipeline::new(
//!         SlideConverter::new(config.clone())?,
//!         Arc::new(DirectoryScreenshots::new("screenshots")),
//!     );
//!
//!     let items = BatchItem::from_slides(store.deck().await.ordered());
//!     let report = BatchCoordinator::from_config(&config)
//!         .run(items, Arc::new(pipeline))
//!         .await;
//!     for line in report.failure_summary() {
//!         eprintln!("{line}");
//!     }
//!
//!     let mut review = ReviewSession::from_report(report);
//!     let applied = review.accept_all(&store).await?;
//!     println!("applied {applied} slides");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `slidesem` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-slides = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod blocks;
pub mod config;
pub mod convert;
pub mod embeddings;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod review;
pub mod slide;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    BatchCoordinator, BatchEvent, BatchFailure, BatchReport, ItemConverter, SlidePipeline,
};
pub use blocks::{validate, validate_value, ContentBlock, ImageRef, InvalidBlock};
pub use config::{SemanticConfig, SemanticConfigBuilder, DEFAULT_MODEL};
pub use convert::{resolve_backend, SlideConverter};
pub use embeddings::{
    cosine_similarity, EmbeddingBackend, EmbeddingCache, EmbeddingError, EmbeddingRecord,
    EmbeddingTask, GeminiEmbedder, OpenAiEmbedder, SimilarSlide, SimilarityIndex,
};
pub use error::{ConversionError, ErrorKind, GatewayError, SlidesError};
pub use pipeline::gateway::{EdgequakeBackend, Gateway, ModelBackend};
pub use pipeline::input::{DirectoryScreenshots, MemoryScreenshots, Screenshot, ScreenshotProvider};
pub use pipeline::parse::{parse_response, ParseError};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use review::{BatchItem, ItemStatus, ReviewError, ReviewSession};
pub use slide::{Classification, ResultWarning, SemanticResult, SlideExtraction};
pub use store::{Deck, JsonDeckStore, MemorySlideStore, SlideStore, StoreError};
pub use stream::{convert_stream, BatchEventStream};

//! Progress-callback trait for per-slide batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::SemanticConfigBuilder::progress_callback`] to receive
//! events as the batch coordinator resolves each slide.
//!
//! # Ordering guarantee
//!
//! All `on_item_complete` / `on_item_error` calls come from a single
//! collector task, and `current` increases by exactly one per call. A
//! progress bar fed from these events never moves backwards, whatever the
//! configured worker count.
//!
//! # Example
//!
//! ```rust
//! use edgequake_slides::{BatchProgressCallback, SemanticConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_item_complete(&self, ordinal: usize, current: usize, total: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("slide {ordinal}: {current}/{total}");
//!     }
//! }
//!
//! let config = SemanticConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch coordinator as it processes each slide.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any slide is converted.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker moves a slide to `converting`.
    fn on_item_start(&self, ordinal: usize, total: usize) {
        let _ = (ordinal, total);
    }

    /// Called when a slide reaches `ready`.
    ///
    /// * `current`: number of slides resolved so far, including this one
    fn on_item_complete(&self, ordinal: usize, current: usize, total: usize) {
        let _ = (ordinal, current, total);
    }

    /// Called when a slide reaches `error`.
    fn on_item_error(&self, ordinal: usize, current: usize, total: usize, error: String) {
        let _ = (ordinal, current, total, error);
    }

    /// Called once after every slide has been attempted (or the run was
    /// cancelled).
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SemanticConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

//! Batch coordinator: run single-slide conversion over many slides.
//!
//! ## Worker pool
//!
//! Items go into a job queue consumed by `concurrency` workers. Workers
//! report `Started` / `Finished` events over a channel to one collector,
//! which is the only code that mutates items or advances the progress
//! counter. With the default of one worker exactly one conversion is in
//! flight and items resolve in input order.
//!
//! ## Failure isolation
//!
//! A failed item is marked `error`, recorded in [`BatchReport::errors`] and
//! the run moves on. There is no retry loop; callers re-run the failed
//! subset with [`BatchCoordinator::rerun_failed`].
//!
//! ## Cancellation
//!
//! Workers check the [`CancellationToken`] before taking the next item. An
//! item already submitted to the model runs to completion; items never taken
//! stay `pending`.

use crate::config::SemanticConfig;
use crate::convert::SlideConverter;
use crate::error::{ConversionError, ErrorKind};
use crate::pipeline::input::ScreenshotProvider;
use crate::progress::ProgressCallback;
use crate::review::{summarize_failures, BatchItem, ItemStatus};
use crate::slide::{SemanticResult, SlideExtraction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Converts one slide. Implemented by [`SlidePipeline`] for production and by
/// scripted converters in tests.
#[async_trait]
pub trait ItemConverter: Send + Sync {
    async fn convert_item(&self, slide: &SlideExtraction)
        -> Result<SemanticResult, ConversionError>;
}

/// Screenshot lookup followed by [`SlideConverter::convert_slide`].
#[derive(Clone)]
pub struct SlidePipeline {
    converter: SlideConverter,
    screenshots: Arc<dyn ScreenshotProvider>,
}

impl SlidePipeline {
    pub fn new(converter: SlideConverter, screenshots: Arc<dyn ScreenshotProvider>) -> Self {
        Self {
            converter,
            screenshots,
        }
    }

    pub fn converter(&self) -> &SlideConverter {
        &self.converter
    }
}

#[async_trait]
impl ItemConverter for SlidePipeline {
    async fn convert_item(
        &self,
        slide: &SlideExtraction,
    ) -> Result<SemanticResult, ConversionError> {
        let shot = self
            .screenshots
            .screenshot(slide.ordinal)
            .await
            .map_err(|e| {
                ConversionError::new(
                    ErrorKind::MissingScreenshot,
                    format!("Screenshot for slide {} could not be read: {e}", slide.ordinal),
                )
            })?;
        self.converter.convert_slide(slide, shot.as_ref()).await
    }
}

/// One failed item: `(ordinal, kind, message)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub ordinal: usize,
    pub kind: ErrorKind,
    pub message: String,
}

impl BatchFailure {
    pub fn new(ordinal: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ordinal,
            kind,
            message: message.into(),
        }
    }
}

/// Progress notifications, in the order the collector observes them.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started {
        index: usize,
        ordinal: usize,
        total: usize,
    },
    Ready {
        index: usize,
        ordinal: usize,
        current: usize,
        total: usize,
        result: SemanticResult,
    },
    Failed {
        index: usize,
        ordinal: usize,
        current: usize,
        total: usize,
        error: ConversionError,
    },
    Finished {
        total: usize,
        succeeded: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Outcome of one coordinator run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Every item handed to the run, in input order.
    pub items: Vec<BatchItem>,
    /// Failures in completion order.
    pub errors: Vec<BatchFailure>,
    /// Items resolved (ready or error) during this run.
    pub current: usize,
    /// Items this run set out to convert.
    pub total: usize,
    pub succeeded: usize,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn failure_summary(&self) -> Vec<String> {
        summarize_failures(&self.errors)
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status() == status).count()
    }
}

enum WorkerEvent {
    Started(usize),
    Finished(usize, Result<SemanticResult, ConversionError>),
}

type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<(usize, SlideExtraction)>>>;

/// Drives an [`ItemConverter`] over a list of [`BatchItem`]s.
#[derive(Clone)]
pub struct BatchCoordinator {
    concurrency: usize,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BatchCoordinator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Worker count and progress callback taken from `config`.
    pub fn from_config(config: &SemanticConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            progress: config.progress_callback.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run between items when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Convert every `pending`, `error` or `rejected` item, in input order.
    ///
    /// Never fails as a whole: per-item failures end up on the item and in
    /// [`BatchReport::errors`].
    pub async fn run(&self, items: Vec<BatchItem>, converter: Arc<dyn ItemConverter>) -> BatchReport {
        self.run_with_events(items, converter, None).await
    }

    /// Re-run only the items in `error`, leaving every other item as it is.
    pub async fn rerun_failed(
        &self,
        items: Vec<BatchItem>,
        converter: Arc<dyn ItemConverter>,
    ) -> BatchReport {
        let (failed, mut rest): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|i| i.status() == ItemStatus::Error);
        info!("Re-running {} failed item(s)", failed.len());

        let mut report = self.run(failed, converter).await;
        rest.append(&mut report.items);
        rest.sort_by_key(BatchItem::index);
        report.items = rest;
        report
    }

    pub(crate) async fn run_with_events(
        &self,
        mut items: Vec<BatchItem>,
        converter: Arc<dyn ItemConverter>,
        sink: Option<mpsc::UnboundedSender<BatchEvent>>,
    ) -> BatchReport {
        let start = Instant::now();
        let emit = |event: BatchEvent| {
            if let Some(ref tx) = sink {
                let _ = tx.send(event);
            }
        };

        // ── Queue runnable items in input order ──────────────────────────
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let mut total = 0;
        for (pos, item) in items.iter().enumerate() {
            if item.status().is_runnable() && job_tx.send((pos, item.original().clone())).is_ok() {
                total += 1;
            }
        }
        drop(job_tx);

        let workers = self.concurrency.min(total.max(1));
        info!(
            "Batch start: {} of {} item(s), {} worker(s)",
            total,
            items.len(),
            workers
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        // ── Spawn workers ────────────────────────────────────────────────
        let jobs: JobQueue = Arc::new(Mutex::new(job_rx));
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let mut set = JoinSet::new();
        for id in 0..workers {
            set.spawn(worker(
                id,
                Arc::clone(&jobs),
                evt_tx.clone(),
                Arc::clone(&converter),
                self.cancel.clone(),
            ));
        }
        drop(evt_tx);

        // ── Collect ──────────────────────────────────────────────────────
        let mut current = 0;
        let mut succeeded = 0;
        let mut errors = Vec::new();

        while let Some(event) = evt_rx.recv().await {
            match event {
                WorkerEvent::Started(pos) => {
                    let item = &mut items[pos];
                    item.begin_conversion();
                    if let Some(ref cb) = self.progress {
                        cb.on_item_start(item.ordinal(), total);
                    }
                    emit(BatchEvent::Started {
                        index: item.index(),
                        ordinal: item.ordinal(),
                        total,
                    });
                }
                WorkerEvent::Finished(pos, outcome) => {
                    current += 1;
                    let item = &mut items[pos];
                    let (index, ordinal) = (item.index(), item.ordinal());
                    match &outcome {
                        Ok(result) => {
                            succeeded += 1;
                            if let Some(ref cb) = self.progress {
                                cb.on_item_complete(ordinal, current, total);
                            }
                            emit(BatchEvent::Ready {
                                index,
                                ordinal,
                                current,
                                total,
                                result: result.clone(),
                            });
                        }
                        Err(e) => {
                            warn!("Slide {} failed ({}): {}", ordinal, e.kind, e.message);
                            errors.push(BatchFailure::new(ordinal, e.kind, e.message.clone()));
                            if let Some(ref cb) = self.progress {
                                cb.on_item_error(ordinal, current, total, e.to_string());
                            }
                            emit(BatchEvent::Failed {
                                index,
                                ordinal,
                                current,
                                total,
                                error: e.clone(),
                            });
                        }
                    }
                    item.finish_conversion(outcome);
                }
            }
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("Batch worker ended abnormally: {}", e);
            }
        }
        for item in items.iter_mut() {
            if item.status() == ItemStatus::Converting {
                warn!("Slide {} was interrupted; returning it to pending", item.ordinal());
                item.reset_to_pending();
            }
        }

        let cancelled = current < total && self.cancel.is_cancelled();
        let failed = errors.len();
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, succeeded);
        }
        emit(BatchEvent::Finished {
            total,
            succeeded,
            failed,
            cancelled,
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Batch complete: {}/{} ready, {} failed{}, {}ms",
            succeeded,
            total,
            failed,
            if cancelled { ", cancelled" } else { "" },
            duration_ms
        );

        BatchReport {
            items,
            errors,
            current,
            total,
            succeeded,
            cancelled,
            duration_ms,
        }
    }
}

async fn worker(
    id: usize,
    jobs: JobQueue,
    events: mpsc::UnboundedSender<WorkerEvent>,
    converter: Arc<dyn ItemConverter>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            debug!("Worker {}: cancelled", id);
            break;
        }
        let next = jobs.lock().await.recv().await;
        let Some((pos, slide)) = next else { break };
        if cancel.is_cancelled() {
            debug!("Worker {}: cancelled before slide {}", id, slide.ordinal);
            break;
        }

        if events.send(WorkerEvent::Started(pos)).is_err() {
            break;
        }
        let outcome = converter.convert_item(&slide).await;
        if events.send(WorkerEvent::Finished(pos, outcome)).is_err() {
            break;
        }
    }
}

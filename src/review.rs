//! Review state machine for converted slides.
//!
//! ```text
//! pending ──▶ converting ──▶ ready ──▶ accepted   (result applied to the store)
//!                  │           └────▶ rejected   (result discarded)
//!                  └──────────▶ error
//! ```
//!
//! The batch coordinator owns `pending → converting → ready | error`.
//! Once an item is `ready` the decision belongs to the reviewer, through
//! [`ReviewSession`]. `accepted` and `rejected` are terminal for that
//! attempt; only a fresh coordinator run moves an item out of `error` or
//! revisits a `rejected` one.
//!
//! Every transition method checks the current status first and returns a
//! [`ReviewError`] without touching the item when the move is not allowed.

use crate::batch::{BatchFailure, BatchReport};
use crate::blocks::{ContentBlock, InvalidBlock};
use crate::error::{ConversionError, ErrorKind};
use crate::slide::{SemanticResult, SlideExtraction};
use crate::store::{SlideStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Where a batch item is in its conversion and review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Converting,
    Ready,
    Accepted,
    Rejected,
    Error,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Converting => "converting",
            ItemStatus::Ready => "ready",
            ItemStatus::Accepted => "accepted",
            ItemStatus::Rejected => "rejected",
            ItemStatus::Error => "error",
        }
    }

    /// Whether a coordinator run picks this item up. `ready` items wait for
    /// the reviewer and are left alone.
    pub fn is_runnable(self) -> bool {
        matches!(
            self,
            ItemStatus::Pending | ItemStatus::Error | ItemStatus::Rejected
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slide's progress through conversion and review.
///
/// The original extraction is a snapshot taken when the item is created and
/// is never modified; edits go to `ai_content` and `override_title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    index: usize,
    original: SlideExtraction,
    #[serde(default)]
    ai_content: Option<SemanticResult>,
    #[serde(default)]
    override_title: Option<String>,
    status: ItemStatus,
    #[serde(default)]
    error: Option<ConversionError>,
}

impl BatchItem {
    pub fn new(index: usize, original: SlideExtraction) -> Self {
        Self {
            index,
            original,
            ai_content: None,
            override_title: None,
            status: ItemStatus::Pending,
            error: None,
        }
    }

    /// Items for a whole deck, indexed in the given order.
    pub fn from_slides(slides: impl IntoIterator<Item = SlideExtraction>) -> Vec<Self> {
        slides
            .into_iter()
            .enumerate()
            .map(|(i, s)| Self::new(i, s))
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ordinal(&self) -> usize {
        self.original.ordinal
    }

    pub fn slide_id(&self) -> &str {
        &self.original.id
    }

    /// The slide's original title.
    pub fn title(&self) -> &str {
        &self.original.title
    }

    pub fn original(&self) -> &SlideExtraction {
        &self.original
    }

    pub fn ai_content(&self) -> Option<&SemanticResult> {
        self.ai_content.as_ref()
    }

    pub fn override_title(&self) -> Option<&str> {
        self.override_title.as_deref()
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ConversionError> {
        self.error.as_ref()
    }

    /// Title an acceptance would apply: reviewer override, else model title.
    pub fn proposed_title(&self) -> Option<&str> {
        self.override_title
            .as_deref()
            .or_else(|| self.ai_content.as_ref().and_then(|r| r.title.as_deref()))
    }

    pub(crate) fn begin_conversion(&mut self) {
        self.status = ItemStatus::Converting;
        self.ai_content = None;
        self.override_title = None;
        self.error = None;
    }

    pub(crate) fn finish_conversion(&mut self, outcome: Result<SemanticResult, ConversionError>) {
        match outcome {
            Ok(result) => {
                self.ai_content = Some(result);
                self.status = ItemStatus::Ready;
            }
            Err(e) => {
                self.error = Some(e);
                self.status = ItemStatus::Error;
            }
        }
    }

    fn discard(&mut self) {
        self.ai_content = None;
        self.override_title = None;
        self.status = ItemStatus::Rejected;
        debug!("Rejected slide {}", self.ordinal());
    }

    /// Put an interrupted conversion back in the queue.
    pub(crate) fn reset_to_pending(&mut self) {
        self.status = ItemStatus::Pending;
    }
}

/// A rejected review transition.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("No batch item with index {0}")]
    UnknownItem(usize),

    #[error("Item {index} is {status}; only ready items can be accepted or rejected")]
    NotReady { index: usize, status: ItemStatus },

    #[error("Item {0} is ready but carries no converted content")]
    MissingContent(usize),

    #[error("Edited content for item {index} is invalid: {source}")]
    InvalidEdit {
        index: usize,
        #[source]
        source: InvalidBlock,
    },

    #[error("Edited content for item {0} has no blocks")]
    EmptyEdit(usize),

    #[error("Failed to apply item {index}: {source}")]
    Store {
        index: usize,
        #[source]
        source: StoreError,
    },
}

/// Reviewer-facing view over the items of a finished batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewSession {
    items: Vec<BatchItem>,
    #[serde(default)]
    errors: Vec<BatchFailure>,
}

impl ReviewSession {
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            items,
            errors: Vec::new(),
        }
    }

    pub fn from_report(report: BatchReport) -> Self {
        Self {
            items: report.items,
            errors: report.errors,
        }
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&BatchItem> {
        self.items.iter().find(|i| i.index == index)
    }

    pub fn into_items(self) -> Vec<BatchItem> {
        self.items
    }

    /// Failures recorded by the last run, in completion order.
    pub fn errors(&self) -> &[BatchFailure] {
        &self.errors
    }

    /// Clear the error list. Item statuses are unchanged.
    pub fn dismiss_errors(&mut self) {
        self.errors.clear();
    }

    /// Lines like `"2 slides failed (timeout)"`, one per error kind.
    pub fn failure_summary(&self) -> Vec<String> {
        summarize_failures(&self.errors)
    }

    /// Indices of items still in `error`, for a follow-up run.
    pub fn retry_candidates(&self) -> Vec<usize> {
        self.indices_with(ItemStatus::Error)
    }

    pub fn indices_with(&self, status: ItemStatus) -> Vec<usize> {
        self.items
            .iter()
            .filter(|i| i.status == status)
            .map(|i| i.index)
            .collect()
    }

    /// Fold a follow-up run's items back in by index; its errors replace
    /// the current error list.
    pub fn merge_report(&mut self, report: BatchReport) {
        for updated in report.items {
            if let Some(slot) = self.items.iter_mut().find(|i| i.index == updated.index) {
                *slot = updated;
            }
        }
        self.errors = report.errors;
    }

    fn ready_item_mut(&mut self, index: usize) -> Result<&mut BatchItem, ReviewError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.index == index)
            .ok_or(ReviewError::UnknownItem(index))?;
        if item.status != ItemStatus::Ready {
            return Err(ReviewError::NotReady {
                index,
                status: item.status,
            });
        }
        Ok(item)
    }

    /// Set or clear the reviewer's title override on a ready item.
    pub fn set_override_title(
        &mut self,
        index: usize,
        title: Option<String>,
    ) -> Result<(), ReviewError> {
        let item = self.ready_item_mut(index)?;
        item.override_title = title.filter(|t| !t.trim().is_empty());
        Ok(())
    }

    /// Accept a ready item, optionally with reviewer-edited blocks and title,
    /// and apply the result to the store.
    ///
    /// If the store write fails the item stays `ready`.
    pub async fn accept(
        &mut self,
        index: usize,
        content: Option<Vec<ContentBlock>>,
        title: Option<String>,
        store: &dyn SlideStore,
    ) -> Result<(), ReviewError> {
        let item = self.ready_item_mut(index)?;

        if let Some(ref blocks) = content {
            if blocks.is_empty() {
                return Err(ReviewError::EmptyEdit(index));
            }
            for block in blocks {
                block
                    .validate()
                    .map_err(|source| ReviewError::InvalidEdit { index, source })?;
            }
        }

        let mut result = item
            .ai_content
            .clone()
            .ok_or(ReviewError::MissingContent(index))?;
        if let Some(blocks) = content {
            result.blocks = blocks;
        }
        let title = title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| item.override_title.clone());
        if title.is_some() {
            result.title = title.clone();
        }

        store
            .apply_semantic_result(item.slide_id(), &result)
            .await
            .map_err(|source| ReviewError::Store { index, source })?;

        item.ai_content = Some(result);
        item.override_title = title;
        item.status = ItemStatus::Accepted;
        info!("Accepted slide {} ({})", item.ordinal(), item.slide_id());
        Ok(())
    }

    /// Reject a ready item, discarding its AI content.
    pub fn reject(&mut self, index: usize) -> Result<(), ReviewError> {
        self.ready_item_mut(index)?.discard();
        Ok(())
    }

    /// Accept every `ready` item unedited. Items in other states are not
    /// touched. Stops at the first store failure, leaving that item and any
    /// later ones `ready`.
    pub async fn accept_all(&mut self, store: &dyn SlideStore) -> Result<usize, ReviewError> {
        let ready = self.indices_with(ItemStatus::Ready);
        for &index in &ready {
            self.accept(index, None, None, store).await?;
        }
        Ok(ready.len())
    }

    /// Reject every `ready` item. Returns how many were rejected.
    pub fn reject_all(&mut self) -> usize {
        let mut rejected = 0;
        for item in self.items.iter_mut().filter(|i| i.status == ItemStatus::Ready) {
            item.discard();
            rejected += 1;
        }
        rejected
    }

    /// Count of items per status.
    pub fn status_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Bucket failures by kind: `"N slide(s) failed (<kind>)"`.
pub fn summarize_failures(errors: &[BatchFailure]) -> Vec<String> {
    let mut buckets: BTreeMap<ErrorKind, usize> = BTreeMap::new();
    for e in errors {
        *buckets.entry(e.kind).or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(kind, n)| {
            let noun = if n == 1 { "slide" } else { "slides" };
            format!("{n} {noun} failed ({})", kind.label())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::Classification;
    use crate::store::MemorySlideStore;

    fn slide(i: usize) -> SlideExtraction {
        SlideExtraction {
            id: format!("s{i}"),
            ordinal: i + 1,
            title: format!("Slide {}", i + 1),
            layout: String::new(),
            notes: String::new(),
            content: vec![ContentBlock::paragraph("raw").unwrap()],
        }
    }

    fn result() -> SemanticResult {
        SemanticResult {
            title: Some("Better title".into()),
            summary: "s".into(),
            classification: Classification::List,
            blocks: vec![ContentBlock::paragraph("clean").unwrap()],
            warnings: vec![],
        }
    }

    /// Items 0 and 2 ready, 1 error, 3 pending.
    fn session() -> (ReviewSession, MemorySlideStore) {
        let mut items = BatchItem::from_slides((0..4).map(slide));
        for (i, item) in items.iter_mut().enumerate().take(3) {
            item.begin_conversion();
            if i == 1 {
                item.finish_conversion(Err(ConversionError::new(ErrorKind::Timeout, "timed out")));
            } else {
                item.finish_conversion(Ok(result()));
            }
        }
        (
            ReviewSession::new(items),
            MemorySlideStore::new((0..4).map(slide)),
        )
    }

    #[tokio::test]
    async fn accept_applies_to_store() {
        let (mut s, store) = session();
        s.accept(0, None, None, &store).await.unwrap();
        assert_eq!(s.item(0).unwrap().status(), ItemStatus::Accepted);
        let applied = store.applied("s0").await.unwrap();
        assert_eq!(applied.title.as_deref(), Some("Better title"));
        // Original snapshot is untouched.
        assert_eq!(s.item(0).unwrap().original().title, "Slide 1");
    }

    #[tokio::test]
    async fn accept_with_edits() {
        let (mut s, store) = session();
        let edited = vec![ContentBlock::heading("Edited", 2).unwrap()];
        s.accept(2, Some(edited.clone()), Some("Mine".into()), &store)
            .await
            .unwrap();
        let applied = store.applied("s2").await.unwrap();
        assert_eq!(applied.blocks, edited);
        assert_eq!(applied.title.as_deref(), Some("Mine"));
    }

    #[tokio::test]
    async fn accept_on_non_ready_is_rejected_without_change() {
        let (mut s, store) = session();
        for index in [1, 3] {
            let before = s.item(index).unwrap().clone();
            let err = s.accept(index, None, None, &store).await.unwrap_err();
            assert!(matches!(err, ReviewError::NotReady { .. }));
            assert_eq!(s.item(index).unwrap(), &before);
        }
        assert!(matches!(
            s.accept(99, None, None, &store).await,
            Err(ReviewError::UnknownItem(99))
        ));
    }

    #[tokio::test]
    async fn invalid_edit_keeps_item_ready() {
        let (mut s, store) = session();
        let bad = vec![ContentBlock::Paragraph(crate::blocks::ParagraphBlock {
            text: "  ".into(),
        })];
        let err = s.accept(0, Some(bad), None, &store).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidEdit { index: 0, .. }));
        assert_eq!(s.item(0).unwrap().status(), ItemStatus::Ready);
        assert!(store.applied("s0").await.is_none());
    }

    #[tokio::test]
    async fn accept_all_touches_only_ready_items() {
        let (mut s, store) = session();
        assert_eq!(s.accept_all(&store).await.unwrap(), 2);
        let statuses: Vec<_> = s.items().iter().map(|i| i.status()).collect();
        assert_eq!(
            statuses,
            vec![
                ItemStatus::Accepted,
                ItemStatus::Error,
                ItemStatus::Accepted,
                ItemStatus::Pending
            ]
        );
    }

    #[test]
    fn reject_all_discards_content() {
        let (mut s, _) = session();
        assert_eq!(s.reject_all(), 2);
        assert!(s.item(0).unwrap().ai_content().is_none());
        assert_eq!(s.item(1).unwrap().status(), ItemStatus::Error);
        assert!(matches!(s.reject(0), Err(ReviewError::NotReady { .. })));
    }

    #[test]
    fn retry_candidates_and_summary() {
        let (mut s, _) = session();
        assert_eq!(s.retry_candidates(), vec![1]);
        s.errors = vec![
            BatchFailure::new(2, ErrorKind::Timeout, "a"),
            BatchFailure::new(5, ErrorKind::Timeout, "b"),
            BatchFailure::new(7, ErrorKind::MissingScreenshot, "c"),
        ];
        assert_eq!(
            s.failure_summary(),
            vec!["2 slides failed (timeout)", "1 slide failed (no screenshot)"]
        );
        s.dismiss_errors();
        assert!(s.errors().is_empty());
        assert_eq!(s.retry_candidates(), vec![1]);
    }

    #[tokio::test]
    async fn ready_item_without_content_is_not_applied() {
        let json = serde_json::json!({
            "items": [{"index": 0, "original": slide(0), "status": "ready"}]
        });
        let mut s: ReviewSession = serde_json::from_value(json).unwrap();
        let store = MemorySlideStore::new([slide(0)]);

        let err = s.accept(0, None, None, &store).await.unwrap_err();
        assert!(matches!(err, ReviewError::MissingContent(0)));
        assert_eq!(s.item(0).unwrap().status(), ItemStatus::Ready);
        assert!(store.applied("s0").await.is_none());
        assert_eq!(store.content("s0").await, Some(slide(0).content));
        assert_eq!(s.accept_all(&store).await.unwrap_err().to_string(), err.to_string());
    }

    #[test]
    fn override_title_only_on_ready() {
        let (mut s, _) = session();
        s.set_override_title(0, Some("Custom".into())).unwrap();
        assert_eq!(s.item(0).unwrap().proposed_title(), Some("Custom"));
        assert!(s.set_override_title(3, Some("x".into())).is_err());
    }
}

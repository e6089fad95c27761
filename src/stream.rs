//! Streaming batch API: observe items as they resolve.
//!
//! ## Why stream?
//!
//! A deck of fifty slides at the default single worker takes minutes. The
//! eager [`BatchCoordinator::run`] returns only at the end; [`convert_stream`]
//! runs the same coordinator on a background task and yields a
//! [`BatchEvent`] for every transition, so a UI can render results while the
//! rest of the deck is still converting.
//!
//! Events arrive in collector order: `current` on `Ready`/`Failed` events is
//! strictly increasing, and the stream ends with exactly one `Finished`.

use crate::batch::{BatchCoordinator, BatchEvent, BatchReport, ItemConverter};
use crate::review::BatchItem;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of batch events.
pub type BatchEventStream = Pin<Box<dyn Stream<Item = BatchEvent> + Send>>;

/// Start a batch run in the background.
///
/// Returns the event stream and a handle resolving to the final
/// [`BatchReport`]. Dropping the stream does not stop the run; cancel it
/// through [`BatchCoordinator::cancellation_token`].
///
/// # Example
/// ```rust,no_run
/// use edgequake_slides::{convert_stream, BatchCoordinator, BatchEvent, BatchItem, ItemConverter};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # async fn demo(items: Vec<BatchItem>, converter: Arc<dyn ItemConverter>) {
/// let (mut events, report) = convert_stream(BatchCoordinator::new(1), items, converter);
/// while let Some(event) = events.next().await {
///     if let BatchEvent::Failed { ordinal, error, .. } = event {
///         eprintln!("slide {ordinal}: {error}");
///     }
/// }
/// let report = report.await.expect("batch task");
/// println!("{}/{} ready", report.succeeded, report.total);
/// # }
/// ```
pub fn convert_stream(
    coordinator: BatchCoordinator,
    items: Vec<BatchItem>,
    converter: Arc<dyn ItemConverter>,
) -> (BatchEventStream, JoinHandle<BatchReport>) {
    info!("Starting streaming batch over {} item(s)", items.len());
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        coordinator
            .run_with_events(items, converter, Some(tx))
            .await
    });
    (Box::pin(UnboundedReceiverStream::new(rx)), handle)
}

//! Screenshot acquisition: map a slide ordinal to image bytes.
//!
//! Screenshots are produced by an external renderer. The pipeline only needs
//! bytes plus a MIME type, and must treat an absent screenshot as an ordinary
//! per-slide condition rather than a crash. A provider therefore returns
//! `Ok(None)` for "no screenshot", and `Err` only when one exists but could
//! not be read.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File extensions probed by [`DirectoryScreenshots`], in order.
pub const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

/// Image bytes for one slide.
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
}

impl Screenshot {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Build a screenshot, detecting the MIME type from magic bytes.
    ///
    /// Returns `None` when the bytes are not a recognised image format.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Option<Self> {
        let bytes = bytes.into();
        let mime = sniff_mime(&bytes)?;
        Some(Self::new(bytes, mime))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Detect an image MIME type from its leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// Source of slide screenshots, keyed by slide ordinal.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    /// `Ok(None)` means no screenshot exists for this slide.
    async fn screenshot(&self, ordinal: usize) -> io::Result<Option<Screenshot>>;
}

/// Screenshots stored as `<dir>/slide_<ordinal>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectoryScreenshots {
    dir: PathBuf,
}

impl DirectoryScreenshots {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Candidate paths for one ordinal, in probe order.
    pub fn candidates(&self, ordinal: usize) -> impl Iterator<Item = PathBuf> + '_ {
        SCREENSHOT_EXTENSIONS
            .iter()
            .map(move |ext| self.dir.join(format!("slide_{ordinal}.{ext}")))
    }
}

#[async_trait]
impl ScreenshotProvider for DirectoryScreenshots {
    async fn screenshot(&self, ordinal: usize) -> io::Result<Option<Screenshot>> {
        for path in self.candidates(ordinal) {
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if bytes.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is empty", path.display()),
                ));
            }
            let shot = Screenshot::from_bytes(bytes).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is not a recognised image", path.display()),
                )
            })?;
            debug!(
                "Slide {}: screenshot {} ({}, {} bytes)",
                ordinal,
                path.display(),
                shot.mime_type,
                shot.len()
            );
            return Ok(Some(shot));
        }
        Ok(None)
    }
}

/// In-memory screenshots, mainly for tests and embedding callers that
/// already hold the bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryScreenshots {
    shots: HashMap<usize, Screenshot>,
}

impl MemoryScreenshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ordinal: usize, shot: Screenshot) -> &mut Self {
        self.shots.insert(ordinal, shot);
        self
    }

    pub fn remove(&mut self, ordinal: usize) -> Option<Screenshot> {
        self.shots.remove(&ordinal)
    }
}

impl FromIterator<(usize, Screenshot)> for MemoryScreenshots {
    fn from_iter<I: IntoIterator<Item = (usize, Screenshot)>>(iter: I) -> Self {
        Self {
            shots: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ScreenshotProvider for MemoryScreenshots {
    async fn screenshot(&self, ordinal: usize) -> io::Result<Option<Screenshot>> {
        Ok(self.shots.get(&ordinal).cloned())
    }
}

//! Resources discovered on a page and the on-disk artifacts derived from them.
//!
//! The `ordinal` assigned at discovery travels with every artifact through
//! every stage. Batch stages finish in arbitrary order; sorting by ordinal
//! (never by vector position) is what keeps the merged pages in page order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One image reference found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// 0-based position in document order.
    pub ordinal: usize,
    /// Absolute URL of the image.
    pub url: String,
}

/// The current on-disk file standing in for a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub ordinal: usize,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(ordinal: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            ordinal,
            path: path.into(),
        }
    }

    /// Same stem, different extension: the path the next stage writes to.
    pub fn successor_path(&self, extension: &str) -> PathBuf {
        self.path.with_extension(extension)
    }
}

/// What kind of file an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Vector,
    Raster,
    Document,
    Unknown,
}

impl ArtifactKind {
    /// Classify by extension alone.
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("svg") => ArtifactKind::Vector,
            Some("png") | Some("jpg") | Some("jpeg") => ArtifactKind::Raster,
            Some("pdf") => ArtifactKind::Document,
            _ => ArtifactKind::Unknown,
        }
    }

    /// Classify by leading bytes, for files saved without a useful extension.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"\x89PNG") || bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return ArtifactKind::Raster;
        }
        if bytes.starts_with(b"%PDF") {
            return ArtifactKind::Document;
        }
        let head = &bytes[..bytes.len().min(1024)];
        let head = String::from_utf8_lossy(head);
        let trimmed = head.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with('<') && head.contains("<svg") {
            return ArtifactKind::Vector;
        }
        ArtifactKind::Unknown
    }

    /// Extension first, content sniff when the extension says nothing.
    pub fn detect(path: &Path, bytes: &[u8]) -> Self {
        match Self::from_extension(path) {
            ArtifactKind::Unknown => Self::sniff(bytes),
            kind => kind,
        }
    }
}

//! Error types for the sheet2pdf library.
//!
//! Three error types reflect three distinct scopes of failure:
//!
//! * [`Sheet2PdfError`] — **Fatal to a job**: the pipeline for one page URL
//!   cannot continue (navigation failed, a download returned 404, the merge
//!   could not load a document). Returned as `Err(Sheet2PdfError)` from the
//!   individual stage functions.
//!
//! * [`ResourceError`] — **Scoped to one resource**: a single image failed
//!   inside a fan-out stage. Recorded in
//!   [`crate::pipeline::batch::StageReport`] so the caller can see exactly
//!   which ordinals failed before the batch is turned into a
//!   [`Sheet2PdfError::BatchFailed`].
//!
//! * [`JobError`] — **Scoped to one job, reported at the run boundary**: the
//!   stage a job died in plus its rendered message. Stored inside
//!   [`crate::output::JobOutcome`] so one failing URL never affects its
//!   siblings.

use crate::output::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All job-fatal errors returned by the sheet2pdf library.
#[derive(Debug, Error)]
pub enum Sheet2PdfError {
    // ── Browser errors ────────────────────────────────────────────────────
    /// The rendering engine could not be started.
    #[error("Failed to launch browser: {0}\nInstall Chrome/Chromium or pass --chrome <PATH>.")]
    BrowserLaunch(String),

    /// Page load, selector query or element read failed.
    #[error("Navigation failed for '{url}': {detail}")]
    Navigation { url: String, detail: String },

    /// An element's attribute never became populated within the wait budget.
    #[error("Attribute '{attribute}' of resource #{ordinal} was not populated after {waited_ms}ms")]
    AttributeTimeout {
        attribute: String,
        ordinal: usize,
        waited_ms: u64,
    },

    /// The page rendered, but no container matched the selector.
    #[error("No resources found on '{url}'\nCheck --selector against the page markup.")]
    NoResources { url: String },

    /// A discovered attribute value is not a usable absolute URL.
    #[error("Invalid resource URL '{url}': {reason}")]
    InvalidResourceUrl { url: String, reason: String },

    // ── Download errors ───────────────────────────────────────────────────
    /// The server answered with a non-success status code.
    #[error("Failed to download '{url}': HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Connection, TLS or body-streaming failure.
    #[error("Failed to download '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The download exceeded the configured client timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Rasterising a vector image or paginating a raster image failed.
    #[error("Conversion failed for '{path}': {detail}")]
    Conversion { path: PathBuf, detail: String },

    /// Loading, copying or serialising a document during the merge failed.
    #[error("Merge into '{path}' failed: {detail}")]
    Merge { path: PathBuf, detail: String },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// At least one resource of a fan-out stage failed.
    ///
    /// Successful siblings keep their outputs on disk.
    #[error("{failed}/{total} resources failed during {stage}\nFirst error: {first_error}")]
    BatchFailed {
        stage: Stage,
        failed: usize,
        total: usize,
        first_error: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// mkdir / read / write / unlink / rename failure.
    #[error("Filesystem error at '{path}': {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Sheet2PdfError {
    /// Shorthand for wrapping an `io::Error` with the path it concerns.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Sheet2PdfError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// A single resource's failure inside a fan-out stage.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Resource #{ordinal}: {stage} failed: {detail}")]
pub struct ResourceError {
    pub ordinal: usize,
    pub stage: Stage,
    pub detail: String,
}

/// The failure recorded for a job that did not produce its document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{stage} stage failed: {message}")]
pub struct JobError {
    pub stage: Stage,
    pub message: String,
}

impl JobError {
    pub fn new(stage: Stage, error: &Sheet2PdfError) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

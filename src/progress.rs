//! Progress-callback trait for run, job and stage events.
//!
//! Inject an [`Arc<dyn AssemblyProgressCallback>`] via
//! [`crate::config::AssemblyConfigBuilder::progress_callback`] to receive
//! events as jobs move through the pipeline. Callers can forward them to a
//! terminal progress bar, a channel or a log without the library knowing
//! how the host application reports status.
//!
//! # Example
//!
//! ```rust
//! use sheet2pdf::{AssemblyConfig, AssemblyProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl AssemblyProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, url: &str, output: &Path, pages: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{url}: {pages} pages → {}", output.display());
//!     }
//! }
//!
//! let config = AssemblyConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as jobs advance.
///
/// Jobs run concurrently, so every method may be called from several tasks
/// at once; implementations must guard shared mutable state. All methods
/// default to no-ops.
pub trait AssemblyProgressCallback: Send + Sync {
    /// Called once before any job starts.
    fn on_run_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a job begins navigating to its page.
    fn on_job_start(&self, url: &str) {
        let _ = url;
    }

    /// Called when a job enters a stage.
    ///
    /// `resources` is 0 for [`Stage::Locate`] (nothing discovered yet).
    fn on_stage_start(&self, url: &str, stage: Stage, resources: usize) {
        let _ = (url, stage, resources);
    }

    /// Called when a job has written its merged document.
    fn on_job_complete(&self, url: &str, output: &Path, pages: usize) {
        let _ = (url, output, pages);
    }

    /// Called when a job fails; `error` is human readable.
    fn on_job_error(&self, url: &str, stage: Stage, error: &str) {
        let _ = (url, stage, error);
    }

    /// Called once after every job has been attempted.
    fn on_run_complete(&self, total_jobs: usize, succeeded: usize) {
        let _ = (total_jobs, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AssemblyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssemblyConfig`].
pub type ProgressCallback = Arc<dyn AssemblyProgressCallback>;

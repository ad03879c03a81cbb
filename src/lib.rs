//! # sheet2pdf
//!
//! Collect the images of a dynamically rendered web page (a sheet-music
//! viewer, a slide deck, a scanned-book reader) into one ordered PDF.
//!
//! ## Why this crate?
//!
//! Viewers like these never expose a "download" button for the whole
//! document. Each page is an `<img>` whose `src` is filled in by script only
//! once it scrolls into view, and the images are usually SVGs that a PDF
//! cannot embed directly. This crate drives a headless browser to collect the
//! URLs in page order, downloads them concurrently, converts each one to a
//! single PDF page and merges the pages back in their original order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page URL
//!  │
//!  ├─ 1. Locate     open the page, scroll each container, wait for its src
//!  ├─ 2. Collection create <output_root>/<title>_<hash>/
//!  ├─ 3. Download   concurrent streaming GETs, one file per resource
//!  ├─ 4. Rasterize  SVG → PNG via resvg (CPU-bound, spawn_blocking)
//!  ├─ 5. Paginate   PNG → one-page PDF, scaled to fit and centred
//!  └─ 6. Merge      pages in ordinal order → output.pdf, intermediates deleted
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheet2pdf::browser::chromium::{ChromiumEngine, ChromiumOptions};
//! use sheet2pdf::{assemble_all, AssemblyConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(ChromiumEngine::launch(ChromiumOptions::default()).await?);
//!     let config = AssemblyConfig::builder().output_root("scores").build()?;
//!     let urls = vec!["https://musescore.com/user/1/scores/2".to_string()];
//!     let summary = assemble_all(&urls, engine, &config).await;
//!     for job in &summary.jobs {
//!         match (&job.report, &job.error) {
//!             (Some(r), _) => println!("{} → {}", job.url, r.output_path.display()),
//!             (_, Some(e)) => eprintln!("{}: {}", job.url, e),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `sheet2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `chromium` | on      | [`browser::chromium::ChromiumEngine`], a local Chrome/Chromium over CDP |
//!
//! Disable both to drive the pipeline with your own [`BrowserEngine`]:
//! ```toml
//! sheet2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod browser;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod resource;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{assemble, assemble_all, assemble_sync};
pub use browser::{BrowserEngine, ElementHandle, PageHandle};
pub use config::{AssemblyConfig, AssemblyConfigBuilder, CollectionNaming, PageSize, WaitUntil};
pub use error::{JobError, ResourceError, Sheet2PdfError};
pub use output::{JobOutcome, JobReport, JobStats, RunSummary, Stage};
pub use progress::{AssemblyProgressCallback, NoopProgressCallback, ProgressCallback};
pub use resource::{Artifact, ArtifactKind, Resource};
pub use stream::{assemble_stream, JobStream};

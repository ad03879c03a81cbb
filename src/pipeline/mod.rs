//! Pipeline stages for page-to-PDF assembly.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different rasteriser) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! locate ──▶ collection ──▶ download ──▶ rasterize ──▶ paginate ──▶ merge
//! (browser)   (mkdir)       (reqwest)    (resvg)       (lopdf)      (lopdf)
//! ```
//!
//! 1. [`locate`]     — walk the page's containers in order and wait for
//!    each lazily populated image URL
//! 2. [`collection`] — derive the job's directory name and create it
//! 3. [`download`]   — stream every image to disk; the only stage with
//!    network I/O
//! 4. [`rasterize`]  — SVG → PNG; runs in `spawn_blocking`
//! 5. [`paginate`]   — PNG → one-page PDF, scaled to fit and centred
//! 6. [`merge`]      — concatenate the pages in ordinal order into the
//!    final document
//!
//! Stages 3–5 fan out over all resources through [`batch`] and only hand
//! on to the next stage once every resource has finished.

pub mod batch;
pub mod collection;
pub mod download;
pub mod locate;
pub mod merge;
pub mod paginate;
pub mod rasterize;

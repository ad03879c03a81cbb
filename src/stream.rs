//! Streaming assembly API: emit job outcomes as they complete.
//!
//! ## Why stream?
//!
//! A run over many pages takes minutes. A stream-based API lets callers
//! report each finished document immediately, or hand it to the next tool,
//! instead of waiting for the slowest page of the run.
//!
//! Unlike the eager [`crate::assemble::assemble_all`] which returns only
//! after every job finishes, [`assemble_stream`] yields [`JobOutcome`] items
//! in completion order. Match on `url` if input order matters.

use crate::assemble::assemble;
use crate::browser::BrowserEngine;
use crate::config::AssemblyConfig;
use crate::output::JobOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{error, info};

/// A boxed stream of job outcomes.
pub type JobStream = Pin<Box<dyn Stream<Item = JobOutcome> + Send>>;

/// Run every URL as an independent job, yielding each outcome when ready.
///
/// All jobs run concurrently. A failed job yields an outcome carrying its
/// [`crate::JobError`]; it never ends the stream early.
pub fn assemble_stream(
    urls: Vec<String>,
    engine: Arc<dyn BrowserEngine>,
    config: &AssemblyConfig,
) -> JobStream {
    info!("Starting streaming run: {} jobs", urls.len());
    let in_flight = urls.len().max(1);
    let config = config.clone();

    let s = stream::iter(urls.into_iter().map(move |url| {
        let engine = Arc::clone(&engine);
        let cfg = config.clone();
        async move {
            let result = assemble(&url, engine.as_ref(), &cfg).await;
            if let Err(ref e) = result {
                error!("{}: {}", url, e);
            }
            JobOutcome::from_result(url, result)
        }
    }))
    .buffer_unordered(in_flight);

    Box::pin(s)
}

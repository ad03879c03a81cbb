//! Fan-out/fan-in over the resources of one job.
//!
//! Every batch stage (download, rasterize, paginate) runs one operation per
//! resource concurrently and waits for all of them before the job moves on.
//! The per-resource outcomes are kept in a [`StageReport`] rather than
//! short-circuiting on the first error, so the report shows every failing
//! ordinal and every file that was produced.
//!
//! Rollback policy: none. Outputs of successful siblings stay on disk when
//! the batch as a whole fails; they are the only copy of work already done
//! and a failed job is left as-is for inspection.

use crate::error::{ResourceError, Sheet2PdfError};
use crate::output::Stage;
use crate::resource::Artifact;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use tracing::warn;

/// The result of one resource's operation within a stage.
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub ordinal: usize,
    pub result: Result<PathBuf, ResourceError>,
}

impl ResourceOutcome {
    /// Tag a stage operation's result with its ordinal and stage.
    pub fn new(ordinal: usize, stage: Stage, result: Result<PathBuf, Sheet2PdfError>) -> Self {
        Self {
            ordinal,
            result: result.map_err(|e| ResourceError {
                ordinal,
                stage,
                detail: e.to_string(),
            }),
        }
    }
}

/// All outcomes of one stage, sorted by ordinal.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub outcomes: Vec<ResourceOutcome>,
}

impl StageReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.total() - self.failed()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ResourceError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// The produced artifacts in ordinal order, or `BatchFailed` if any
    /// resource failed.
    pub fn into_artifacts(self) -> Result<Vec<Artifact>, Sheet2PdfError> {
        let failed = self.failed();
        if failed > 0 {
            for e in self.errors() {
                warn!("{}", e);
            }
            let first_error = self
                .errors()
                .next()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Sheet2PdfError::BatchFailed {
                stage: self.stage,
                failed,
                total: self.total(),
                first_error,
            });
        }
        Ok(self
            .outcomes
            .into_iter()
            .filter_map(|o| o.result.ok().map(|path| Artifact::new(o.ordinal, path)))
            .collect())
    }
}

/// Run `op` over every item with at most `concurrency` in flight and
/// collect the outcomes, sorted by ordinal.
pub async fn run_batch<I, F, Fut>(
    stage: Stage,
    items: Vec<I>,
    concurrency: usize,
    op: F,
) -> StageReport
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = ResourceOutcome>,
{
    let mut outcomes: Vec<ResourceOutcome> = stream::iter(items.into_iter().map(op))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|o| o.ordinal);
    StageReport { stage, outcomes }
}

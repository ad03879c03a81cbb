//! Eager (whole-run) assembly entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: run every job, then return one
//! [`RunSummary`] with the outcomes in input order. Use
//! [`crate::stream::assemble_stream`] instead when you want each job's
//! outcome as soon as it finishes.
//!
//! ## Failure isolation
//!
//! A job is one page URL. Every stage error ends that job, tagged with the
//! stage it happened in, and is logged with the URL. Sibling jobs are never
//! cancelled and the run itself never fails because of a job.
//!
//! Jobs that resolve to the same collection directory (a URL listed twice,
//! say) take turns from collection creation through merge; each still
//! reports its own outcome.

use crate::browser::{BrowserEngine, PageHandle};
use crate::config::AssemblyConfig;
use crate::error::{JobError, Sheet2PdfError};
use crate::output::{JobOutcome, JobReport, JobStats, RunSummary, Stage};
use crate::pipeline::batch::StageReport;
use crate::pipeline::collection::{collection_name, ensure_collection, lock_collection};
use crate::pipeline::download::{download_all, Downloader};
use crate::pipeline::locate::{locate_resources, LocatedPage};
use crate::pipeline::merge::{merge_documents, page_count};
use crate::pipeline::paginate::paginate_all;
use crate::pipeline::rasterize::rasterize_all;
use crate::resource::Artifact;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Assemble the images of one page into one document.
///
/// # Returns
/// `Ok(JobReport)` once the merged document is written and every
/// intermediate file is gone.
///
/// # Errors
/// `Err(JobError)` naming the stage that failed. Files written by earlier
/// stages (and by successful siblings within the failing stage) are left
/// where they are.
pub async fn assemble(
    url: &str,
    engine: &dyn BrowserEngine,
    config: &AssemblyConfig,
) -> Result<JobReport, JobError> {
    let total_start = Instant::now();
    info!("Starting job: {}", url);
    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(url);
    }

    let mut stats = JobStats::default();
    let result = run_job(url, engine, config, &mut stats).await;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    match result {
        Ok(mut report) => {
            report.stats = stats;
            info!(
                "Job complete: {} → {} ({} pages, {}ms)",
                url,
                report.output_path.display(),
                report.page_count,
                report.stats.total_duration_ms
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_job_complete(url, &report.output_path, report.page_count);
            }
            Ok(report)
        }
        Err((stage, e)) => {
            let job_error = JobError::new(stage, &e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_job_error(url, stage, &job_error.message);
            }
            Err(job_error)
        }
    }
}

/// Run every URL as an independent job, all concurrently.
///
/// Outcomes are returned in the order of `urls`.
pub async fn assemble_all(
    urls: &[String],
    engine: Arc<dyn BrowserEngine>,
    config: &AssemblyConfig,
) -> RunSummary {
    let run_start = Instant::now();
    info!("Starting run: {} jobs", urls.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(urls.len());
    }

    let jobs = urls.iter().map(|url| {
        let engine = Arc::clone(&engine);
        async move {
            let result = assemble(url, engine.as_ref(), config).await;
            if let Err(ref e) = result {
                error!("{}: {}", url, e);
            }
            JobOutcome::from_result(url.clone(), result)
        }
    });
    let summary = RunSummary {
        jobs: join_all(jobs).await,
        total_duration_ms: run_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {}/{} jobs succeeded, {}ms total",
        summary.succeeded(),
        summary.jobs.len(),
        summary.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(urls.len(), summary.succeeded());
    }
    summary
}

/// Synchronous wrapper around [`assemble_all`].
///
/// Creates a temporary tokio runtime internally. The engine must not depend
/// on another runtime being alive (the Chromium engine does, so launch it
/// inside an async context and call [`assemble_all`] instead).
pub fn assemble_sync(
    urls: &[String],
    engine: Arc<dyn BrowserEngine>,
    config: &AssemblyConfig,
) -> Result<RunSummary, Sheet2PdfError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| Sheet2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(assemble_all(urls, engine, config)))
}

// ── Internal helpers ─────────────────────────────────────────────────────

type StageResult<T> = Result<T, (Stage, Sheet2PdfError)>;

fn at<T>(stage: Stage, result: Result<T, Sheet2PdfError>) -> StageResult<T> {
    result.map_err(|e| (stage, e))
}

async fn run_job(
    url: &str,
    engine: &dyn BrowserEngine,
    config: &AssemblyConfig,
    stats: &mut JobStats,
) -> StageResult<JobReport> {
    // ── Step 1: Locate ───────────────────────────────────────────────────
    stage_start(config, url, Stage::Locate, 0);
    let locate_start = Instant::now();
    let page = at(Stage::Locate, engine.open(url, config.wait_until).await)?;
    let located = locate_then_close(page, config).await?;
    stats.locate_duration_ms = locate_start.elapsed().as_millis() as u64;
    stats.resources = located.resources.len();
    info!(
        "Located {} resources on '{}' in {}ms",
        stats.resources, located.title, stats.locate_duration_ms
    );

    // ── Step 2: Collection directory ─────────────────────────────────────
    stage_start(config, url, Stage::EnsureDirectory, stats.resources);
    let name = collection_name(&located.title, url, config.collection_naming);
    // Held until the merge is done.
    let _collection_guard = lock_collection(&config.output_root.join(&name)).await;
    let collection = at(
        Stage::EnsureDirectory,
        ensure_collection(&config.output_root, &name).await,
    )?;

    // ── Step 3: Download ─────────────────────────────────────────────────
    stage_start(config, url, Stage::Download, stats.resources);
    let download_start = Instant::now();
    let downloader = at(Stage::Download, Downloader::from_config(config))?;
    let report = download_all(&downloader, &collection, &located.resources, config.concurrency).await;
    let downloaded = finish_batch(report)?;
    stats.download_duration_ms = download_start.elapsed().as_millis() as u64;

    // ── Step 4: Rasterize ────────────────────────────────────────────────
    stage_start(config, url, Stage::Rasterize, stats.resources);
    let rasterize_start = Instant::now();
    let rasters = finish_batch(rasterize_all(downloaded, config).await)?;
    stats.rasterize_duration_ms = rasterize_start.elapsed().as_millis() as u64;

    // ── Step 5: Paginate ─────────────────────────────────────────────────
    stage_start(config, url, Stage::Paginate, stats.resources);
    let paginate_start = Instant::now();
    let documents = finish_batch(paginate_all(rasters, config).await)?;
    stats.paginate_duration_ms = paginate_start.elapsed().as_millis() as u64;

    // ── Step 6: Merge ────────────────────────────────────────────────────
    stage_start(config, url, Stage::Merge, stats.resources);
    let merge_start = Instant::now();
    let inputs: Vec<PathBuf> = documents.into_iter().map(|a| a.path).collect();
    let output_path = collection.join(&config.output_file_name);
    at(Stage::Merge, merge_documents(&inputs, &output_path).await)?;
    let pages = at(Stage::Merge, page_count(&output_path))?;
    stats.merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    Ok(JobReport {
        url: url.to_string(),
        title: located.title,
        collection,
        output_path,
        page_count: pages,
        resources: located.resources.into_iter().map(|r| r.url).collect(),
        stats: JobStats::default(),
    })
}

/// Locate resources, then release the page whether or not that worked.
async fn locate_then_close(
    page: Box<dyn PageHandle>,
    config: &AssemblyConfig,
) -> StageResult<LocatedPage> {
    let located = locate_resources(page.as_ref(), config).await;
    let page_url = page.url().to_string();
    if let Err(e) = page.close().await {
        warn!("Failed to close page {}: {}", page_url, e);
    }
    at(Stage::Locate, located)
}

/// Barrier between batch stages: every resource must have succeeded.
fn finish_batch(report: StageReport) -> StageResult<Vec<Artifact>> {
    let stage = report.stage;
    at(stage, report.into_artifacts())
}

fn stage_start(config: &AssemblyConfig, url: &str, stage: Stage, resources: usize) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(url, stage, resources);
    }
}

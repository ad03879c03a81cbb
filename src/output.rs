//! Result types produced by the assembly pipeline.

use crate::error::JobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One pipeline phase, applied to every resource of a job before the next
/// phase begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Locate,
    EnsureDirectory,
    Download,
    Rasterize,
    Paginate,
    Merge,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Locate,
        Stage::EnsureDirectory,
        Stage::Download,
        Stage::Rasterize,
        Stage::Paginate,
        Stage::Merge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Locate => "locate",
            Stage::EnsureDirectory => "ensure_directory",
            Stage::Download => "download",
            Stage::Rasterize => "rasterize",
            Stage::Paginate => "paginate",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock timings for a successful job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub resources: usize,
    pub locate_duration_ms: u64,
    pub download_duration_ms: u64,
    pub rasterize_duration_ms: u64,
    pub paginate_duration_ms: u64,
    pub merge_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything known about a job that produced its merged document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// The page URL the job started from.
    pub url: String,
    /// Page title as reported by the rendering engine.
    pub title: String,
    /// Directory holding the job's artifacts.
    pub collection: PathBuf,
    /// The merged document.
    pub output_path: PathBuf,
    /// Pages in the merged document (one per resource).
    pub page_count: usize,
    /// Resource URLs in page order.
    pub resources: Vec<String>,
    pub stats: JobStats,
}

/// The terminal state of one job: exactly one of `report` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub url: String,
    pub report: Option<JobReport>,
    pub error: Option<JobError>,
}

impl JobOutcome {
    pub fn from_result(url: impl Into<String>, result: Result<JobReport, JobError>) -> Self {
        let url = url.into();
        match result {
            Ok(report) => Self {
                url,
                report: Some(report),
                error: None,
            },
            Err(error) => Self {
                url,
                report: None,
                error: Some(error),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.report.is_some()
    }
}

/// Outcomes of every job in a run, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub jobs: Vec<JobOutcome>,
    pub total_duration_ms: u64,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }
}

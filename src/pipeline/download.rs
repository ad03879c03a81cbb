//! Resource download: stream every image into the collection directory.
//!
//! One [`Downloader`] (and therefore one connection pool) serves a whole job.
//! Bodies are streamed chunk by chunk straight to disk, so a large raster
//! never sits in memory in full.

use crate::config::AssemblyConfig;
use crate::error::Sheet2PdfError;
use crate::output::Stage;
use crate::pipeline::batch::{run_batch, ResourceOutcome, StageReport};
use crate::resource::Resource;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Shared HTTP client for one job's downloads.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl Downloader {
    pub fn new(timeout_secs: u64) -> Result<Self, Sheet2PdfError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Sheet2PdfError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    pub fn from_config(config: &AssemblyConfig) -> Result<Self, Sheet2PdfError> {
        Self::new(config.download_timeout_secs)
    }

    /// Fetch `resource` into `dir` and return the written path.
    pub async fn download(&self, dir: &Path, resource: &Resource) -> Result<PathBuf, Sheet2PdfError> {
        let url = resource.url.as_str();
        let path = dir.join(resource_file_name(resource));

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Sheet2PdfError::fs(&path, e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Sheet2PdfError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.request_error(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Sheet2PdfError::fs(&path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Sheet2PdfError::fs(&path, e))?;

        debug!(
            "Resource #{} downloaded ({} bytes) → {}",
            resource.ordinal,
            written,
            path.display()
        );
        Ok(path)
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> Sheet2PdfError {
        if e.is_timeout() {
            Sheet2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            Sheet2PdfError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Download every resource concurrently into `dir`.
pub async fn download_all(
    downloader: &Downloader,
    dir: &Path,
    resources: &[Resource],
    concurrency: usize,
) -> StageReport {
    info!("Downloading {} resources into {}", resources.len(), dir.display());
    run_batch(
        Stage::Download,
        resources.to_vec(),
        concurrency,
        |resource: Resource| async move {
            let result = downloader.download(dir, &resource).await;
            ResourceOutcome::new(resource.ordinal, Stage::Download, result)
        },
    )
    .await
}

/// `<ordinal:03>-<last path segment>` for a resource.
///
/// The ordinal prefix keeps names unique within a collection even when two
/// URLs end in the same segment, and makes a directory listing sort in page
/// order.
pub fn resource_file_name(resource: &Resource) -> String {
    let segment = reqwest::Url::parse(&resource.url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .map(|s| String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned())
        .unwrap_or_default();

    let cleaned: String = segment
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    let name = if cleaned.is_empty() { "resource" } else { cleaned };
    format!("{:03}-{}", resource.ordinal, name)
}

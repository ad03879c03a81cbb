//! Integration tests for the full assembly pipeline.
//!
//! The browser is replaced by an in-memory engine whose pages hand out image
//! URLs pointing at a local `wiremock` server, so every stage after
//! discovery (download, rasterise, paginate, merge) runs for real.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use futures::StreamExt;
use lopdf::Document;
use sheet2pdf::{
    assemble, assemble_all, assemble_stream, assemble_sync, AssemblyConfig, AssemblyProgressCallback,
    BrowserEngine, ElementHandle, PageHandle, Sheet2PdfError, Stage, WaitUntil,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Fake browser ─────────────────────────────────────────────────────────────

/// What the fake browser shows for one page URL.
#[derive(Clone)]
struct FakePageSpec {
    title: String,
    /// One entry per container; `None` never populates its `src`.
    images: Vec<Option<String>>,
    /// Reads that return nothing before `src` appears.
    lazy_reads: usize,
}

#[derive(Default)]
struct FakeEngine {
    pages: HashMap<String, FakePageSpec>,
}

impl FakeEngine {
    fn with_page(mut self, url: &str, spec: FakePageSpec) -> Self {
        self.pages.insert(url.to_string(), spec);
        self
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn open(&self, url: &str, _wait: WaitUntil) -> Result<Box<dyn PageHandle>, Sheet2PdfError> {
        let spec = self.pages.get(url).cloned().ok_or_else(|| Sheet2PdfError::Navigation {
            url: url.to_string(),
            detail: "net::ERR_NAME_NOT_RESOLVED".into(),
        })?;
        Ok(Box::new(FakePage {
            url: url.to_string(),
            spec,
        }))
    }
}

struct FakePage {
    url: String,
    spec: FakePageSpec,
}

#[async_trait]
impl PageHandle for FakePage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn query_all(&self, _selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, Sheet2PdfError> {
        Ok(self
            .spec
            .images
            .iter()
            .map(|src| {
                Box::new(FakeElement {
                    src: src.clone(),
                    lazy_reads: self.spec.lazy_reads,
                    reads: AtomicUsize::new(0),
                    scrolled: AtomicUsize::new(0),
                }) as Box<dyn ElementHandle>
            })
            .collect())
    }

    async fn title(&self) -> Result<Option<String>, Sheet2PdfError> {
        Ok(Some(self.spec.title.clone()))
    }

    async fn close(self: Box<Self>) -> Result<(), Sheet2PdfError> {
        Ok(())
    }
}

struct FakeElement {
    src: Option<String>,
    lazy_reads: usize,
    reads: AtomicUsize,
    scrolled: AtomicUsize,
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn scroll_into_view(&self) -> Result<(), Sheet2PdfError> {
        self.scrolled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn child_attribute(
        &self,
        _selector: &str,
        _attribute: &str,
    ) -> Result<Option<String>, Sheet2PdfError> {
        // Like a lazy viewer: nothing until the container has been scrolled to.
        if self.scrolled.load(Ordering::SeqCst) == 0 {
            return Ok(None);
        }
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.lazy_reads {
            return Ok(None);
        }
        Ok(self.src.clone())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn svg(width: u32) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="50">
            <rect width="{width}" height="50" fill="#222"/>
        </svg>"##
    )
}

/// Serve `/score_<i>.svg` with width `widths[i]`. Earlier files answer
/// slower so downloads finish in reverse order.
async fn serve_scores(server: &MockServer, widths: &[u32]) -> Vec<Option<String>> {
    let n = widths.len() as u64;
    let mut urls = Vec::new();
    for (i, width) in widths.iter().enumerate() {
        let route = format!("/score_{i}.svg");
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/svg+xml")
                    .set_body_string(svg(*width))
                    .set_delay(Duration::from_millis(30 * (n - i as u64))),
            )
            .mount(server)
            .await;
        urls.push(Some(format!("{}{}", server.uri(), route)));
    }
    urls
}

fn config(root: &Path) -> AssemblyConfig {
    AssemblyConfig::builder()
        .output_root(root)
        .poll_interval_ms(5)
        .attribute_timeout_secs(5)
        .download_timeout_secs(10)
        .build()
        .unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn only_subdir(root: &Path) -> PathBuf {
    let dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(dirs.len(), 1, "expected one collection, got {dirs:?}");
    dirs.into_iter().next().unwrap()
}

/// Width of the image drawn on each page, in page order.
fn page_image_widths(pdf: &Path) -> Vec<i64> {
    let doc = Document::load(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
            let stream = doc.get_object(image).unwrap().as_stream().unwrap();
            stream.dict.get(b"Width").unwrap().as_i64().unwrap()
        })
        .collect()
}

#[derive(Default)]
struct CountingCallback {
    run_start: AtomicUsize,
    job_start: AtomicUsize,
    stages: AtomicUsize,
    job_complete: AtomicUsize,
    job_error: AtomicUsize,
    run_complete_succeeded: AtomicUsize,
}

impl AssemblyProgressCallback for CountingCallback {
    fn on_run_start(&self, _total_jobs: usize) {
        self.run_start.fetch_add(1, Ordering::SeqCst);
    }
    fn on_job_start(&self, _url: &str) {
        self.job_start.fetch_add(1, Ordering::SeqCst);
    }
    fn on_stage_start(&self, _url: &str, _stage: Stage, _resources: usize) {
        self.stages.fetch_add(1, Ordering::SeqCst);
    }
    fn on_job_complete(&self, _url: &str, _output: &Path, _pages: usize) {
        self.job_complete.fetch_add(1, Ordering::SeqCst);
    }
    fn on_job_error(&self, _url: &str, _stage: Stage, _error: &str) {
        self.job_error.fetch_add(1, Ordering::SeqCst);
    }
    fn on_run_complete(&self, _total_jobs: usize, succeeded: usize) {
        self.run_complete_succeeded.store(succeeded, Ordering::SeqCst);
    }
}

const PAGE_A: &str = "https://scores.example.com/user/1/scores/100";
const PAGE_B: &str = "https://scores.example.com/user/1/scores/200";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pages_follow_discovery_order() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100, 200, 300]).await;
    let engine = FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Listen To Your Heart (Cover)".into(),
            images,
            lazy_reads: 2,
        },
    );
    let root = tempfile::tempdir().unwrap();

    let report = assemble(PAGE_A, &engine, &config(root.path())).await.unwrap();

    assert_eq!(report.page_count, 3);
    assert_eq!(report.stats.resources, 3);
    assert_eq!(page_image_widths(&report.output_path), vec![100, 200, 300]);
    assert!(report.resources[0].ends_with("/score_0.svg"));
    assert!(report
        .collection
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Listen_To_Your_Heart_Cover_"));
}

#[tokio::test]
async fn only_the_merged_document_remains() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[120, 140]).await;
    let engine = FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Nocturne".into(),
            images,
            lazy_reads: 0,
        },
    );
    let root = tempfile::tempdir().unwrap();

    let report = assemble(PAGE_A, &engine, &config(root.path())).await.unwrap();
    assert_eq!(file_names(&report.collection), vec!["output.pdf"]);
}

#[tokio::test]
async fn one_missing_resource_fails_only_its_job() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100, 200]).await;
    Mock::given(method("GET"))
        .and(path("/gone.svg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut broken = images.clone();
    broken.push(Some(format!("{}/gone.svg", server.uri())));

    let engine: Arc<dyn BrowserEngine> = Arc::new(
        FakeEngine::default()
            .with_page(
                PAGE_A,
                FakePageSpec {
                    title: "Good".into(),
                    images,
                    lazy_reads: 0,
                },
            )
            .with_page(
                PAGE_B,
                FakePageSpec {
                    title: "Broken".into(),
                    images: broken,
                    lazy_reads: 0,
                },
            ),
    );
    let root = tempfile::tempdir().unwrap();
    let urls = vec![PAGE_A.to_string(), PAGE_B.to_string()];

    let summary = assemble_all(&urls, engine, &config(root.path())).await;

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.jobs[0].url, PAGE_A);
    let good = summary.jobs[0].report.as_ref().unwrap();
    assert!(good.output_path.exists());

    let error = summary.jobs[1].error.as_ref().unwrap();
    assert_eq!(error.stage, Stage::Download);
    assert!(error.message.contains("404"), "got: {}", error.message);
}

#[tokio::test]
async fn attribute_that_never_populates_fails_locate() {
    let engine = FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Stuck".into(),
            images: vec![None],
            lazy_reads: 0,
        },
    );
    let root = tempfile::tempdir().unwrap();
    let config = AssemblyConfig::builder()
        .output_root(root.path())
        .poll_interval_ms(10)
        .attribute_timeout_secs(1)
        .build()
        .unwrap();

    let err = assemble(PAGE_A, &engine, &config).await.unwrap_err();
    assert_eq!(err.stage, Stage::Locate);
    assert!(err.message.contains("not populated"), "got: {}", err.message);
    // Nothing was created for a job that never got its resources.
    assert!(file_names(root.path()).is_empty());
}

#[tokio::test]
async fn page_without_containers_fails_locate() {
    let engine = FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Empty".into(),
            images: vec![],
            lazy_reads: 0,
        },
    );
    let root = tempfile::tempdir().unwrap();

    let err = assemble(PAGE_A, &engine, &config(root.path())).await.unwrap_err();
    assert_eq!(err.stage, Stage::Locate);
    assert!(err.message.contains("No resources"));
}

#[tokio::test]
async fn navigation_failure_fails_locate() {
    let engine = FakeEngine::default();
    let root = tempfile::tempdir().unwrap();

    let err = assemble(PAGE_A, &engine, &config(root.path())).await.unwrap_err();
    assert_eq!(err.stage, Stage::Locate);
    assert!(err.message.contains("ERR_NAME_NOT_RESOLVED"));
}

#[tokio::test]
async fn one_bad_conversion_keeps_sibling_rasters() {
    let server = MockServer::start().await;
    let mut images = serve_scores(&server, &[100, 110, 120, 130]).await;
    Mock::given(method("GET"))
        .and(path("/broken.svg"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<svg xmlns=\"http://www.w3.org/2000/svg\""))
        .mount(&server)
        .await;
    images.insert(2, Some(format!("{}/broken.svg", server.uri())));

    let engine = FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Five Pages".into(),
            images,
            lazy_reads: 0,
        },
    );
    let root = tempfile::tempdir().unwrap();

    let err = assemble(PAGE_A, &engine, &config(root.path())).await.unwrap_err();
    assert_eq!(err.stage, Stage::Rasterize);
    assert!(err.message.contains("1/5"), "got: {}", err.message);

    let names = file_names(&only_subdir(root.path()));
    let pngs = names.iter().filter(|n| n.ends_with(".png")).count();
    assert_eq!(pngs, 4, "got: {names:?}");
    assert!(names.contains(&"002-broken.svg".to_string()));
    assert!(!names.contains(&"output.pdf".to_string()));
}

#[tokio::test]
async fn equal_titles_get_separate_collections() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100]).await;
    let spec = FakePageSpec {
        title: "Untitled".into(),
        images,
        lazy_reads: 0,
    };
    let engine: Arc<dyn BrowserEngine> = Arc::new(
        FakeEngine::default()
            .with_page(PAGE_A, spec.clone())
            .with_page(PAGE_B, spec),
    );
    let root = tempfile::tempdir().unwrap();
    let urls = vec![PAGE_A.to_string(), PAGE_B.to_string()];

    let summary = assemble_all(&urls, engine, &config(root.path())).await;

    assert_eq!(summary.succeeded(), 2);
    let a = summary.jobs[0].report.as_ref().unwrap();
    let b = summary.jobs[1].report.as_ref().unwrap();
    assert_ne!(a.collection, b.collection);
    assert!(a.output_path.exists() && b.output_path.exists());
}

#[tokio::test]
async fn repeated_url_jobs_do_not_collide() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100, 110, 120, 130, 140]).await;
    let engine: Arc<dyn BrowserEngine> = Arc::new(FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Dup".into(),
            images,
            lazy_reads: 0,
        },
    ));
    let root = tempfile::tempdir().unwrap();
    let urls = vec![PAGE_A.to_string(), PAGE_A.to_string(), PAGE_A.to_string()];

    let summary = assemble_all(&urls, engine, &config(root.path())).await;

    for job in &summary.jobs {
        assert!(job.is_success(), "{:?}", job.error);
    }
    assert_eq!(summary.jobs.len(), 3);
    let collection = only_subdir(root.path());
    assert_eq!(file_names(&collection), vec!["output.pdf"]);
    assert_eq!(
        page_image_widths(&collection.join("output.pdf")),
        vec![100, 110, 120, 130, 140]
    );
}

#[tokio::test]
async fn jobs_run_on_spawned_tasks() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100]).await;
    let engine: Arc<dyn BrowserEngine> = Arc::new(FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Spawned".into(),
            images,
            lazy_reads: 0,
        },
    ));
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());

    let single = tokio::spawn({
        let engine = Arc::clone(&engine);
        let config = config.clone();
        async move { assemble(PAGE_A, engine.as_ref(), &config).await }
    });
    assert!(single.await.unwrap().is_ok());

    let streamed = tokio::spawn(async move {
        assemble_stream(vec![PAGE_A.to_string()], engine, &config)
            .collect::<Vec<_>>()
            .await
    });
    let outcomes = streamed.await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success(), "{:?}", outcomes[0].error);
}

#[tokio::test]
async fn stream_yields_one_outcome_per_url() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100, 200]).await;
    let engine: Arc<dyn BrowserEngine> = Arc::new(FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Streamed".into(),
            images,
            lazy_reads: 0,
        },
    ));
    let root = tempfile::tempdir().unwrap();
    let urls = vec![PAGE_A.to_string(), PAGE_B.to_string()];

    let outcomes: Vec<_> = assemble_stream(urls, engine, &config(root.path()))
        .collect()
        .await;

    assert_eq!(outcomes.len(), 2);
    let a = outcomes.iter().find(|o| o.url == PAGE_A).unwrap();
    let b = outcomes.iter().find(|o| o.url == PAGE_B).unwrap();
    assert!(a.is_success());
    assert_eq!(b.error.as_ref().unwrap().stage, Stage::Locate);
}

#[tokio::test]
async fn progress_callback_sees_every_job() {
    let server = MockServer::start().await;
    let images = serve_scores(&server, &[100]).await;
    let engine: Arc<dyn BrowserEngine> = Arc::new(FakeEngine::default().with_page(
        PAGE_A,
        FakePageSpec {
            title: "Tracked".into(),
            images,
            lazy_reads: 0,
        },
    ));
    let root = tempfile::tempdir().unwrap();
    let cb = Arc::new(CountingCallback::default());
    let config = AssemblyConfig::builder()
        .output_root(root.path())
        .poll_interval_ms(5)
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let urls = vec![PAGE_A.to_string(), PAGE_B.to_string()];

    let summary = assemble_all(&urls, engine, &config).await;

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(cb.run_start.load(Ordering::SeqCst), 1);
    assert_eq!(cb.job_start.load(Ordering::SeqCst), 2);
    assert_eq!(cb.job_complete.load(Ordering::SeqCst), 1);
    assert_eq!(cb.job_error.load(Ordering::SeqCst), 1);
    assert_eq!(cb.run_complete_succeeded.load(Ordering::SeqCst), 1);
    // Six stages for the good job, one for the job that failed to open.
    assert_eq!(cb.stages.load(Ordering::SeqCst), Stage::ALL.len() + 1);
}

#[test]
fn sync_wrapper_owns_its_runtime() {
    let root = tempfile::tempdir().unwrap();
    let urls = vec![PAGE_B.to_string()];
    let summary = assemble_sync(&urls, Arc::new(FakeEngine::default()), &config(root.path())).unwrap();
    assert_eq!(summary.jobs.len(), 1);
    assert_eq!(summary.failed(), 1);
}

#[test]
fn summary_serialises_to_json() {
    let summary = sheet2pdf::RunSummary::default();
    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"jobs\":[]"));
}

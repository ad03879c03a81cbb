//! CLI binary for sheet2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AssemblyConfig`, launches Chrome and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sheet2pdf::browser::chromium::{ChromiumEngine, ChromiumOptions};
use sheet2pdf::{
    assemble_all, AssemblyConfig, AssemblyProgressCallback, BrowserEngine, CollectionNaming,
    PageSize, ProgressCallback, RunSummary, Stage, WaitUntil,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over jobs, one log line per finished
/// job. Jobs run concurrently, so lines arrive in completion order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-job wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Assembling");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, url: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(url)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AssemblyProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_jobs: usize) {
        self.bar.set_length(total_jobs as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Assembling {total_jobs} documents…"))
        ));
    }

    fn on_job_start(&self, url: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(url.to_string(), Instant::now());
    }

    fn on_stage_start(&self, _url: &str, stage: Stage, resources: usize) {
        if resources > 0 {
            self.bar.set_message(format!("{stage} ({resources} images)"));
        } else {
            self.bar.set_message(stage.to_string());
        }
    }

    fn on_job_complete(&self, url: &str, output: &Path, pages: usize) {
        let secs = self.elapsed_secs(url);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            bold(&output.display().to_string()),
            dim(&format!("{pages:>3} pages")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, url: &str, stage: Stage, error: &str) {
        let secs = self.elapsed_secs(url);

        // First line only; the full message goes to the summary.
        let msg = error.lines().next().unwrap_or(error);
        let msg = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg.to_string()
        };

        self.bar.println(format!(
            "  {} {}  {} {}  {}",
            red("✗"),
            url,
            red(&format!("[{stage}]")),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_jobs: usize, succeeded: usize) {
        let failed = total_jobs.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents assembled successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents assembled  ({} failed)",
                if failed == total_jobs {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_jobs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One score into ./<Title>_<hash>/output.pdf
  sheet2pdf https://musescore.com/user/123/scores/456

  # Several pages, collected under ./scores
  sheet2pdf -o scores URL1 URL2 URL3

  # URLs from a file (one per line, # comments allowed)
  sheet2pdf --urls-file wanted.txt

  # A different viewer markup
  sheet2pdf --selector '.page' --image-selector 'img.scan' --attribute data-src URL

  # Running as root inside a container
  sheet2pdf --no-sandbox URL

  # Machine-readable summary
  sheet2pdf --json URL > run.json

ENVIRONMENT VARIABLES:
  Every flag can also be set through SHEET2PDF_<FLAG>, e.g.
  SHEET2PDF_OUTPUT_ROOT, SHEET2PDF_CONCURRENCY, SHEET2PDF_CHROME.
  RUST_LOG overrides the log filter (e.g. RUST_LOG=sheet2pdf=debug).

EXIT STATUS:
  0 once every URL has been attempted, even if some jobs failed
  (see the summary or --json for per-URL results). Non-zero only when
  the run could not start: bad flags, no URLs, browser launch failure.
"#;

/// Collect the images of dynamically rendered pages into ordered PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "sheet2pdf",
    version,
    about = "Collect the images of dynamically rendered pages into ordered PDFs",
    long_about = "Open each page in headless Chrome, collect the lazily loaded page images in \
document order, download them concurrently, convert SVG to PNG to single-page PDF and merge \
the pages into one PDF per URL.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page URLs to assemble.
    urls: Vec<String>,

    /// Read additional URLs from this file (one per line).
    #[arg(long, env = "SHEET2PDF_URLS_FILE")]
    urls_file: Option<PathBuf>,

    /// Directory under which collection directories are created.
    #[arg(short, long = "output-root", env = "SHEET2PDF_OUTPUT_ROOT", default_value = ".")]
    output_root: PathBuf,

    // ── Page lookup ──────────────────────────────────────────────────────
    /// CSS selector of the per-image containers.
    #[arg(long, env = "SHEET2PDF_SELECTOR", default_value = ".EEnGW")]
    selector: String,

    /// Selector of the image element inside each container.
    #[arg(long, env = "SHEET2PDF_IMAGE_SELECTOR", default_value = "img")]
    image_selector: String,

    /// Attribute carrying the image URL.
    #[arg(long, env = "SHEET2PDF_ATTRIBUTE", default_value = "src")]
    attribute: String,

    /// How far page loading must progress before querying.
    #[arg(long, env = "SHEET2PDF_WAIT_UNTIL", value_enum, default_value = "dom-content-loaded")]
    wait_until: WaitArg,

    /// Milliseconds between attribute checks.
    #[arg(long, env = "SHEET2PDF_POLL_INTERVAL", default_value_t = 150)]
    poll_interval: u64,

    /// Seconds to wait for one image URL to appear.
    #[arg(long, env = "SHEET2PDF_ATTRIBUTE_TIMEOUT", default_value_t = 30)]
    attribute_timeout: u64,

    // ── Pipeline tuning ──────────────────────────────────────────────────
    /// Maximum concurrent downloads / conversions per page.
    #[arg(short, long, env = "SHEET2PDF_CONCURRENCY", default_value_t = 16)]
    concurrency: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SHEET2PDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// SVG rasterisation scale (0.1–8.0).
    #[arg(long, env = "SHEET2PDF_RASTER_SCALE", default_value_t = 1.0)]
    raster_scale: f32,

    /// Output page width in PDF points.
    #[arg(long, env = "SHEET2PDF_PAGE_WIDTH", default_value_t = 600.0)]
    page_width: f32,

    /// Output page height in PDF points.
    #[arg(long, env = "SHEET2PDF_PAGE_HEIGHT", default_value_t = 800.0)]
    page_height: f32,

    /// File name of the merged document in each collection.
    #[arg(long, env = "SHEET2PDF_OUTPUT_NAME", default_value = "output.pdf")]
    output_name: String,

    /// Name collections by title alone (no URL hash suffix).
    #[arg(long, env = "SHEET2PDF_TITLE_ONLY_NAMES")]
    title_only_names: bool,

    // ── Browser ──────────────────────────────────────────────────────────
    /// Path to the Chrome/Chromium executable (auto-detected if unset).
    #[arg(long, env = "SHEET2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// Launch the browser with --no-sandbox.
    #[arg(long, env = "SHEET2PDF_NO_SANDBOX")]
    no_sandbox: bool,

    // ── Output and logging ───────────────────────────────────────────────
    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "SHEET2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SHEET2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SHEET2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SHEET2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum WaitArg {
    DomContentLoaded,
    Load,
}

impl From<WaitArg> for WaitUntil {
    fn from(v: WaitArg) -> Self {
        match v {
            WaitArg::DomContentLoaded => WaitUntil::DomContentLoaded,
            WaitArg::Load => WaitUntil::Load,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Collect URLs ─────────────────────────────────────────────────────
    let mut urls = cli.urls.clone();
    if let Some(ref path) = cli.urls_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read URL list from {:?}", path))?;
        urls.extend(parse_url_list(&text));
    }
    if urls.is_empty() {
        anyhow::bail!("No URLs given (pass them as arguments or with --urls-file)");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AssemblyProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Launch browser ───────────────────────────────────────────────────
    let engine = ChromiumEngine::launch(ChromiumOptions {
        executable: cli.chrome.clone(),
        no_sandbox: cli.no_sandbox,
        ..ChromiumOptions::default()
    })
    .await
    .context("Failed to start the browser")?;
    let engine = Arc::new(engine);

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = assemble_all(&urls, Arc::clone(&engine) as Arc<dyn BrowserEngine>, &config).await;

    if let Ok(engine) = Arc::try_unwrap(engine) {
        if let Err(e) = engine.close().await {
            tracing::warn!("{}", e);
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&summary, show_progress);
    }

    Ok(())
}

/// Map CLI args to `AssemblyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssemblyConfig> {
    let naming = if cli.title_only_names {
        CollectionNaming::Title
    } else {
        CollectionNaming::TitleWithUrlHash
    };

    let mut builder = AssemblyConfig::builder()
        .output_root(&cli.output_root)
        .container_selector(&cli.selector)
        .image_selector(&cli.image_selector)
        .source_attribute(&cli.attribute)
        .wait_until(cli.wait_until.clone().into())
        .poll_interval_ms(cli.poll_interval)
        .attribute_timeout_secs(cli.attribute_timeout)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .raster_scale(cli.raster_scale)
        .page_size(PageSize {
            width: cli.page_width,
            height: cli.page_height,
        })
        .output_file_name(&cli.output_name)
        .collection_naming(naming);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One URL per line; blank lines and `#` comments are skipped.
fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn print_summary(summary: &RunSummary, progress_shown: bool) {
    // The progress callback already printed one line per job.
    if !progress_shown {
        for job in &summary.jobs {
            match (&job.report, &job.error) {
                (Some(report), _) => eprintln!(
                    "{}  {}  {} pages  {}ms  →  {}",
                    green("✔"),
                    job.url,
                    report.page_count,
                    report.stats.total_duration_ms,
                    bold(&report.output_path.display().to_string()),
                ),
                (_, Some(error)) => eprintln!("{}  {}  {}", red("✘"), job.url, error),
                _ => {}
            }
        }
    }

    let failed: Vec<_> = summary.jobs.iter().filter(|j| !j.is_success()).collect();
    if progress_shown && !failed.is_empty() {
        eprintln!();
        for job in failed {
            if let Some(ref error) = job.error {
                eprintln!("{}  {}\n   {}", red("✘"), job.url, dim(&error.to_string()));
            }
        }
    }
    eprintln!(
        "   {}/{} succeeded  —  {}ms total",
        summary.succeeded(),
        summary.jobs.len(),
        summary.total_duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_skips_comments_and_blanks() {
        let text = "# wanted\nhttps://a.example/1\n\n   https://a.example/2  \n#https://skip\n";
        assert_eq!(
            parse_url_list(text),
            vec!["https://a.example/1", "https://a.example/2"]
        );
    }

    #[test]
    fn cli_maps_onto_config() {
        let cli = Cli::parse_from([
            "sheet2pdf",
            "-o",
            "out",
            "--selector",
            ".page",
            "--title-only-names",
            "-c",
            "4",
            "https://a.example/1",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.output_root, PathBuf::from("out"));
        assert_eq!(config.container_selector, ".page");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.collection_naming, CollectionNaming::Title);
        assert_eq!(cli.urls, vec!["https://a.example/1"]);
    }

    #[test]
    fn cli_rejects_bad_output_name() {
        let cli = Cli::parse_from(["sheet2pdf", "--output-name", "a/b.pdf", "https://x"]);
        assert!(build_config(&cli, None).is_err());
    }
}

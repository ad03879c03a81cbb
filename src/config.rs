//! Configuration types for page-to-PDF assembly.
//!
//! All pipeline behaviour is controlled through [`AssemblyConfig`], built
//! via its [`AssemblyConfigBuilder`]. Every stage receives the same config,
//! including the output root, so nothing depends on the process working
//! directory or the install location of the binary.

use crate::error::Sheet2PdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an assembly run.
///
/// Built via [`AssemblyConfig::builder()`] or using
/// [`AssemblyConfig::default()`].
///
/// # Example
/// ```rust
/// use sheet2pdf::AssemblyConfig;
///
/// let config = AssemblyConfig::builder()
///     .output_root("scores")
///     .concurrency(8)
///     .attribute_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AssemblyConfig {
    /// Directory under which every job's collection directory is created. Default: `.`.
    pub output_root: PathBuf,

    /// CSS selector matching one container per image, in document order. Default: `.EEnGW`.
    pub container_selector: String,

    /// Selector, relative to a container, of the element carrying the URL. Default: `img`.
    pub image_selector: String,

    /// Attribute holding the resource URL. Default: `src`.
    pub source_attribute: String,

    /// How far page loading must progress before querying. Default: [`WaitUntil::DomContentLoaded`].
    pub wait_until: WaitUntil,

    /// Interval between attribute re-checks in milliseconds. Default: 150.
    ///
    /// Viewers that lazy-load their pages only fill in `src` once the
    /// container is scrolled into view; a short poll picks it up promptly
    /// without hammering the DevTools connection.
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for one attribute, in seconds. Default: 30.
    ///
    /// A container whose attribute never populates fails the job with
    /// [`Sheet2PdfError::AttributeTimeout`] instead of stalling it forever.
    pub attribute_timeout_secs: u64,

    /// Maximum in-flight operations per fan-out stage. Default: 16.
    pub concurrency: usize,

    /// HTTP client timeout for each resource download in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Scale factor applied when rasterising SVGs. Range: 0.1–8.0. Default: 1.0.
    ///
    /// 1.0 renders at the SVG's intrinsic size. Raise it for crisper pages
    /// when the source images are small; the page geometry is unaffected
    /// because every image is scaled to fit anyway.
    pub raster_scale: f32,

    /// Geometry of every page in the output. Default: 600 × 800 points.
    pub page_size: PageSize,

    /// File name of the merged document inside the collection. Default: `output.pdf`.
    pub output_file_name: String,

    /// How collection directories are named. Default: [`CollectionNaming::TitleWithUrlHash`].
    pub collection_naming: CollectionNaming,

    /// Optional progress callback receiving run, job and stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            container_selector: ".EEnGW".to_string(),
            image_selector: "img".to_string(),
            source_attribute: "src".to_string(),
            wait_until: WaitUntil::default(),
            poll_interval_ms: 150,
            attribute_timeout_secs: 30,
            concurrency: 16,
            download_timeout_secs: 120,
            raster_scale: 1.0,
            page_size: PageSize::default(),
            output_file_name: "output.pdf".to_string(),
            collection_naming: CollectionNaming::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfig")
            .field("output_root", &self.output_root)
            .field("container_selector", &self.container_selector)
            .field("image_selector", &self.image_selector)
            .field("source_attribute", &self.source_attribute)
            .field("wait_until", &self.wait_until)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("attribute_timeout_secs", &self.attribute_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("raster_scale", &self.raster_scale)
            .field("page_size", &self.page_size)
            .field("output_file_name", &self.output_file_name)
            .field("collection_naming", &self.collection_naming)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AssemblyProgressCallback>"),
            )
            .finish()
    }
}

impl AssemblyConfig {
    /// Create a new builder for `AssemblyConfig`.
    pub fn builder() -> AssemblyConfigBuilder {
        AssemblyConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn attribute_timeout(&self) -> Duration {
        Duration::from_secs(self.attribute_timeout_secs)
    }
}

/// Builder for [`AssemblyConfig`].
#[derive(Debug)]
pub struct AssemblyConfigBuilder {
    config: AssemblyConfig,
}

impl AssemblyConfigBuilder {
    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.output_root = root.into();
        self
    }

    pub fn container_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.container_selector = selector.into();
        self
    }

    pub fn image_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.image_selector = selector.into();
        self
    }

    pub fn source_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.config.source_attribute = attribute.into();
        self
    }

    pub fn wait_until(mut self, wait: WaitUntil) -> Self {
        self.config.wait_until = wait;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn attribute_timeout_secs(mut self, secs: u64) -> Self {
        self.config.attribute_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn raster_scale(mut self, scale: f32) -> Self {
        self.config.raster_scale = scale.clamp(0.1, 8.0);
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn output_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_file_name = name.into();
        self
    }

    pub fn collection_naming(mut self, naming: CollectionNaming) -> Self {
        self.config.collection_naming = naming;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssemblyConfig, Sheet2PdfError> {
        let c = &self.config;
        if c.container_selector.trim().is_empty() || c.image_selector.trim().is_empty() {
            return Err(Sheet2PdfError::InvalidConfig(
                "Selectors must not be empty".into(),
            ));
        }
        if c.source_attribute.trim().is_empty() {
            return Err(Sheet2PdfError::InvalidConfig(
                "Source attribute must not be empty".into(),
            ));
        }
        if c.poll_interval_ms == 0 {
            return Err(Sheet2PdfError::InvalidConfig(
                "Poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.attribute_timeout_secs == 0 {
            return Err(Sheet2PdfError::InvalidConfig(
                "Attribute timeout must be ≥ 1s".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Sheet2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(c.page_size.width > 0.0 && c.page_size.height > 0.0) {
            return Err(Sheet2PdfError::InvalidConfig(format!(
                "Page size must be positive, got {}x{}",
                c.page_size.width, c.page_size.height
            )));
        }
        let name = c.output_file_name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(Sheet2PdfError::InvalidConfig(format!(
                "Output file name must be a plain file name, got '{}'",
                c.output_file_name
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How far navigation must progress before the page is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitUntil {
    /// The HTML is parsed; images and scripts may still be loading. (default)
    #[default]
    DomContentLoaded,
    /// The `load` event has fired.
    Load,
}

/// Output page geometry in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 800.0,
        }
    }
}

/// Naming scheme for collection directories.
///
/// Two different pages can share a title ("Untitled", "Piano Sonata"), and
/// jobs run concurrently, so a title-only name lets one job overwrite the
/// other's artifacts mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollectionNaming {
    /// Sanitised title only.
    Title,
    /// Sanitised title plus a short hash of the source URL. (default)
    #[default]
    TitleWithUrlHash,
}

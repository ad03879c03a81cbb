//! Seams to the page rendering engine.
//!
//! The pipeline only needs a handful of operations from a browser: open a
//! URL, list elements matching a selector, scroll one into view, read an
//! attribute from a descendant and read the title. They are expressed as
//! object-safe async traits so the orchestrator can share one engine across
//! concurrent jobs (`Arc<dyn BrowserEngine>`) and tests can substitute an
//! in-memory page.
//!
//! [`chromium::ChromiumEngine`] (feature `chromium`) drives a local
//! Chrome/Chromium over the DevTools protocol.

use crate::config::WaitUntil;
use crate::error::Sheet2PdfError;
use async_trait::async_trait;

#[cfg(feature = "chromium")]
pub mod chromium;

/// Something that can load a URL and hand back a queryable page.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a fresh page and navigate it to `url`.
    async fn open(
        &self,
        url: &str,
        wait: WaitUntil,
    ) -> Result<Box<dyn PageHandle>, Sheet2PdfError>;
}

/// A loaded page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// The URL the page was opened with; relative attribute values resolve
    /// against it.
    fn url(&self) -> &str;

    /// All elements matching `selector`, in document order.
    async fn query_all(
        &self,
        selector: &str,
    ) -> Result<Vec<Box<dyn ElementHandle>>, Sheet2PdfError>;

    /// The document title, if any.
    async fn title(&self) -> Result<Option<String>, Sheet2PdfError>;

    /// Release the page.
    async fn close(self: Box<Self>) -> Result<(), Sheet2PdfError>;
}

/// One element on a loaded page.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// Bring the element into the viewport so lazy viewers populate it.
    async fn scroll_into_view(&self) -> Result<(), Sheet2PdfError>;

    /// Read `attribute` from the first descendant matching `selector`.
    ///
    /// `Ok(None)` covers both "no such descendant yet" and "attribute not
    /// set yet"; the caller keeps polling in either case.
    async fn child_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, Sheet2PdfError>;
}

//! Headless Chrome/Chromium engine over the DevTools protocol.
//!
//! One browser process serves every job of a run; each job gets its own
//! tab. `chromiumoxide` requires its event handler to be polled for the
//! connection to make progress, so [`ChromiumEngine::launch`] spawns it on
//! the Tokio runtime and [`ChromiumEngine::close`] tears both down.

use super::{BrowserEngine, ElementHandle, PageHandle};
use crate::config::WaitUntil;
use crate::error::Sheet2PdfError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval between `document.readyState` checks while waiting for
/// `DOMContentLoaded`.
const READY_STATE_POLL: Duration = Duration::from_millis(50);

const DOM_READY_SCRIPT: &str =
    "document.readyState !== 'loading' && location.href !== 'about:blank'";

/// Launch options for [`ChromiumEngine`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Explicit browser binary; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Pass `--no-sandbox` (needed when running as root in containers).
    pub no_sandbox: bool,
    /// Show the browser window.
    pub headful: bool,
    /// Viewport size; a tall viewport makes fewer containers need scrolling.
    pub window_size: (u32, u32),
    /// Upper bound on a single navigation.
    pub navigation_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            no_sandbox: false,
            headful: false,
            window_size: (1280, 1024),
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

/// A running browser shared by every job of a run.
pub struct ChromiumEngine {
    browser: Browser,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromiumEngine {
    /// Start the browser process and its DevTools event loop.
    pub async fn launch(options: ChromiumOptions) -> Result<Self, Sheet2PdfError> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder().window_size(width, height);
        if let Some(ref path) = options.executable {
            builder = builder.chrome_executable(path);
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if options.headful {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Sheet2PdfError::BrowserLaunch)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| Sheet2PdfError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!("DevTools event error: {}", e);
                }
            }
        });

        info!("Browser launched");
        Ok(Self {
            browser,
            handler,
            navigation_timeout: options.navigation_timeout,
        })
    }

    /// Close every tab and stop the browser process.
    pub async fn close(mut self) -> Result<(), Sheet2PdfError> {
        self.browser
            .close()
            .await
            .map_err(|e| Sheet2PdfError::Internal(format!("Browser close failed: {e}")))?;
        self.browser
            .wait()
            .await
            .map_err(|e| Sheet2PdfError::Internal(format!("Browser exit failed: {e}")))?;
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }

    async fn navigate(&self, page: &Page, url: &str, wait: WaitUntil) -> Result<(), Sheet2PdfError> {
        match wait {
            WaitUntil::Load => {
                page.goto(url).await.map_err(|e| navigation_error(url, e))?;
            }
            WaitUntil::DomContentLoaded => {
                page.execute(NavigateParams::new(url))
                    .await
                    .map_err(|e| navigation_error(url, e))?;
                loop {
                    let ready = page
                        .evaluate(DOM_READY_SCRIPT)
                        .await
                        .map_err(|e| navigation_error(url, e))?
                        .into_value::<bool>()
                        .unwrap_or(false);
                    if ready {
                        break;
                    }
                    tokio::time::sleep(READY_STATE_POLL).await;
                }
            }
        }
        Ok(())
    }
}

impl Drop for ChromiumEngine {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn open(
        &self,
        url: &str,
        wait: WaitUntil,
    ) -> Result<Box<dyn PageHandle>, Sheet2PdfError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| navigation_error(url, e))?;

        let secs = self.navigation_timeout.as_secs();
        let navigated =
            match tokio::time::timeout(self.navigation_timeout, self.navigate(&page, url, wait)).await {
                Ok(result) => result,
                Err(_) => Err(Sheet2PdfError::Navigation {
                    url: url.to_string(),
                    detail: format!("navigation did not finish within {secs}s"),
                }),
            };
        if let Err(e) = navigated {
            // The tab outlives this call otherwise.
            if let Err(close_err) = page.close().await {
                warn!("Failed to close tab for {}: {}", url, close_err);
            }
            return Err(e);
        }

        debug!("Opened {} ({:?})", url, wait);
        Ok(Box::new(ChromiumPage {
            page,
            url: url.to_string(),
        }))
    }
}

struct ChromiumPage {
    page: Page,
    url: String,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn query_all(
        &self,
        selector: &str,
    ) -> Result<Vec<Box<dyn ElementHandle>>, Sheet2PdfError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| navigation_error(&self.url, e))?;
        Ok(elements
            .into_iter()
            .map(|element| {
                Box::new(ChromiumElement {
                    element,
                    url: self.url.clone(),
                }) as Box<dyn ElementHandle>
            })
            .collect())
    }

    async fn title(&self) -> Result<Option<String>, Sheet2PdfError> {
        self.page
            .get_title()
            .await
            .map_err(|e| navigation_error(&self.url, e))
    }

    async fn close(self: Box<Self>) -> Result<(), Sheet2PdfError> {
        let url = self.url;
        self.page
            .close()
            .await
            .map_err(|e| navigation_error(&url, e))
    }
}

struct ChromiumElement {
    element: Element,
    url: String,
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn scroll_into_view(&self) -> Result<(), Sheet2PdfError> {
        self.element
            .scroll_into_view()
            .await
            .map_err(|e| navigation_error(&self.url, e))?;
        Ok(())
    }

    async fn child_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, Sheet2PdfError> {
        // Lazy viewers insert the child only once the container is visible.
        let child = match self.element.find_element(selector).await {
            Ok(child) => child,
            Err(_) => return Ok(None),
        };
        child
            .attribute(attribute)
            .await
            .map_err(|e| navigation_error(&self.url, e))
    }
}

fn navigation_error(url: &str, e: impl std::fmt::Display) -> Sheet2PdfError {
    Sheet2PdfError::Navigation {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

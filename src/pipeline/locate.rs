//! Resource discovery: walk the page's containers and collect image URLs.
//!
//! ## Why poll?
//!
//! Score viewers render page images lazily. The `<img>` inside a container
//! exists (or gets inserted) early, but its `src` is only filled in after
//! the container scrolls into view and the viewer's script runs. The
//! DevTools protocol offers no "attribute became non-null" notification we
//! can subscribe to per element, so [`wait_for_attribute`] re-reads it on a
//! fixed interval, bounded by a deadline.
//!
//! ## Why sequential?
//!
//! Containers are visited one at a time so the discovered list is in
//! document order by construction. Each resource is stamped with its
//! ordinal right here; later stages sort by that ordinal.

use crate::browser::{ElementHandle, PageHandle};
use crate::config::AssemblyConfig;
use crate::error::Sheet2PdfError;
use crate::resource::Resource;
use reqwest::Url;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info};

/// Resources discovered on a page, in document order.
#[derive(Debug, Clone)]
pub struct LocatedPage {
    pub title: String,
    pub resources: Vec<Resource>,
}

/// Poll `element`'s descendant `selector` until `attribute` is populated.
///
/// An empty or whitespace-only value counts as not yet populated: lazy
/// viewers often render `src=""` as a placeholder before the real URL lands.
///
/// Returns the attribute value, or [`Sheet2PdfError::AttributeTimeout`]
/// once `limit` has elapsed. Errors reading the element abort immediately.
pub async fn wait_for_attribute(
    element: &dyn ElementHandle,
    selector: &str,
    attribute: &str,
    ordinal: usize,
    poll_interval: Duration,
    limit: Duration,
) -> Result<String, Sheet2PdfError> {
    let start = Instant::now();
    let poll = async {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u64 = 0;
        loop {
            ticker.tick().await;
            attempts += 1;
            if let Some(value) = element.child_attribute(selector, attribute).await? {
                if !value.trim().is_empty() {
                    debug!(
                        "Resource #{}: '{}' populated after {} checks",
                        ordinal, attribute, attempts
                    );
                    return Ok::<_, Sheet2PdfError>(value);
                }
            }
        }
    };

    match timeout(limit, poll).await {
        Ok(result) => result,
        Err(_) => Err(Sheet2PdfError::AttributeTimeout {
            attribute: attribute.to_string(),
            ordinal,
            waited_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

/// Collect every resource URL on `page`, plus its title.
pub async fn locate_resources(
    page: &dyn PageHandle,
    config: &AssemblyConfig,
) -> Result<LocatedPage, Sheet2PdfError> {
    let page_url = page.url().to_string();
    let containers = page.query_all(&config.container_selector).await?;
    if containers.is_empty() {
        return Err(Sheet2PdfError::NoResources { url: page_url });
    }
    info!(
        "Found {} containers matching '{}' on {}",
        containers.len(),
        config.container_selector,
        page_url
    );

    let base = Url::parse(&page_url).ok();
    let mut resources = Vec::with_capacity(containers.len());

    for (ordinal, container) in containers.iter().enumerate() {
        container.scroll_into_view().await?;
        let raw = wait_for_attribute(
            container.as_ref(),
            &config.image_selector,
            &config.source_attribute,
            ordinal,
            config.poll_interval(),
            config.attribute_timeout(),
        )
        .await?;
        let url = resolve_resource_url(base.as_ref(), &raw)?;
        debug!("Resource #{} → {}", ordinal, url);
        resources.push(Resource { ordinal, url });
    }

    let title = page
        .title()
        .await?
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "untitled".to_string());

    Ok(LocatedPage { title, resources })
}

/// Turn an attribute value into an absolute http(s) URL.
pub fn resolve_resource_url(base: Option<&Url>, raw: &str) -> Result<String, Sheet2PdfError> {
    let raw = raw.trim();
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => match base {
            Some(base) => base.join(raw).map_err(|e| Sheet2PdfError::InvalidResourceUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })?,
            None => {
                return Err(Sheet2PdfError::InvalidResourceUrl {
                    url: raw.to_string(),
                    reason: "relative URL without a base page URL".into(),
                })
            }
        },
    };
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(Sheet2PdfError::InvalidResourceUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

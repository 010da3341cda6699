//! Catalog paging.
//!
//! Pages are fetched strictly one after another. A failed fetch or an
//! undecodable page ends the run; there is no resumption from the middle of
//! a feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::feed::{parse_feed, FeedPage};

/// Transport for catalog result pages.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the raw feed document at `url`.
    async fn fetch_page(&self, url: &str) -> SyncResult<String>;
}

/// HTTP catalog transport.
pub struct HttpCatalogSource {
    client: Client,
}

impl HttpCatalogSource {
    pub fn new(request_timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Catalog(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    #[instrument(skip(self))]
    async fn fetch_page(&self, url: &str) -> SyncResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Catalog(format!("{} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| SyncError::Catalog(e.to_string()))
    }
}

/// Lazy walk over a paginated feed.
pub struct CatalogPager<'a> {
    source: &'a dyn CatalogSource,
    next_url: Option<String>,
    pages_read: usize,
}

impl<'a> CatalogPager<'a> {
    pub fn new(source: &'a dyn CatalogSource, first_url: impl Into<String>) -> Self {
        Self {
            source,
            next_url: Some(first_url.into()),
            pages_read: 0,
        }
    }

    pub fn pages_read(&self) -> usize {
        self.pages_read
    }

    /// Fetch and decode the next page, or `None` once the feed is exhausted.
    pub async fn next_page(&mut self) -> SyncResult<Option<FeedPage>> {
        let url = match self.next_url.take() {
            Some(url) => url,
            None => return Ok(None),
        };

        let body = self.source.fetch_page(&url).await?;
        let page = parse_feed(&body)?;
        self.pages_read += 1;

        debug!(
            page = self.pages_read,
            entries = page.entries.len(),
            "Fetched catalog page"
        );

        self.next_url = match page.next.as_deref() {
            Some(next) if next == url => {
                warn!(url = %url, "Catalog page links to itself, stopping");
                None
            }
            Some(next) => Some(next.to_string()),
            None => {
                info!(pages = self.pages_read, "Catalog exhausted");
                None
            }
        };

        Ok(Some(page))
    }
}

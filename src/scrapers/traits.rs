use crate::error::FetchError;
use async_trait::async_trait;

/// Where pages come from.
///
/// The crawl driver and detail extractor receive one of these by
/// construction; production uses [`super::fetcher::HttpFetcher`], tests
/// plug in canned pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch raw markup for an absolute or site-relative URL.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Wait between requests to the same host.
    async fn polite_delay(&self);
}

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, ScrapeError};
use crate::scrapers::traits::PageSource;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP page fetcher for one site: one pooled client, bounded retries with
/// exponential backoff, and a randomized pause between requests.
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(base_url: &str, config: FetchConfig) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(base_url).map_err(|source| ScrapeError::BaseUrl {
            site: base_url.to_string(),
            source,
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Absolute URLs pass through; anything else joins the base URL.
    pub fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        let parsed = if url.starts_with("http://") || url.starts_with("https://") {
            Url::parse(url)
        } else {
            self.base_url.join(url)
        };
        parsed.map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })
    }

    /// Backoff before retry number `attempt` (0-based), with ±25% jitter.
    fn retry_delay(&self, attempt: usize) -> Duration {
        let base = self.config.retry_interval_ms as f64;
        let delay_ms = (base * self.config.backoff_factor.powi(attempt as i32))
            .min(self.config.max_retry_interval_ms as f64);

        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((delay_ms * jitter) as u64)
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let target = self.resolve(url)?;
        let mut attempt = 0;

        loop {
            debug!("GET {} (attempt {})", target, attempt + 1);

            let result = self
                .client
                .get(target.clone())
                .header(reqwest::header::ACCEPT, ACCEPT)
                .send()
                .await;

            let retry = match result {
                Ok(response) if response.status().is_success() => {
                    return response.text().await.map_err(|source| FetchError::Request {
                        url: target.to_string(),
                        source,
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    if !Self::is_retryable_status(status) || attempt >= self.config.max_retries {
                        return Err(FetchError::Status {
                            url: target.to_string(),
                            status,
                        });
                    }
                    format!("HTTP {}", status)
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect() || e.is_request();
                    if !transient || attempt >= self.config.max_retries {
                        return Err(FetchError::Request {
                            url: target.to_string(),
                            source: e,
                        });
                    }
                    e.to_string()
                }
            };

            warn!(
                "{} failed ({}), retry {}/{}",
                target,
                retry,
                attempt + 1,
                self.config.max_retries
            );
            sleep(self.retry_delay(attempt)).await;
            attempt += 1;
        }
    }

    async fn polite_delay(&self) {
        let jitter = if self.config.polite_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.config.polite_jitter_ms)
        } else {
            0
        };
        sleep(Duration::from_millis(self.config.polite_delay_ms + jitter)).await;
    }
}

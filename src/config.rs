use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ScrapeError;

pub const DEFAULT_CONFIG_PATH: &str = "imoveis-scout.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First retry waits this long; later ones grow by `backoff_factor`
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_max_retry_interval")]
    pub max_retry_interval_ms: u64,

    /// Fixed part of the pause between requests
    #[serde(default = "default_polite_delay")]
    pub polite_delay_ms: u64,

    /// Random extra pause, 0..jitter
    #[serde(default = "default_polite_jitter")]
    pub polite_jitter_ms: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// Visit each listing's own page for the richer fields
    #[serde(default = "default_true")]
    pub fetch_details: bool,

    /// Stop after this many result pages
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Delete stored listings not seen in the latest pass
    #[serde(default = "default_true")]
    pub reconcile: bool,
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> String {
    "imoveis.db".to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_interval() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_retry_interval() -> u64 {
    8000
}

fn default_polite_delay() -> u64 {
    500
}

fn default_polite_jitter() -> u64 {
    400
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36"
        .to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval(),
            backoff_factor: default_backoff_factor(),
            max_retry_interval_ms: default_max_retry_interval(),
            polite_delay_ms: default_polite_delay(),
            polite_jitter_ms: default_polite_jitter(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            fetch_details: true,
            max_pages: None,
            reconcile: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            fetch: FetchConfig::default(),
            crawl: CrawlConfig::default(),
        }
    }
}

impl Config {
    /// Load `path`; a missing file means defaults, a broken one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ScrapeError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ScrapeError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            database_path = "/tmp/x.db"

            [crawl]
            max_pages = 2
            "#,
        )
        .unwrap();

        assert_eq!(cfg.database_path, "/tmp/x.db");
        assert_eq!(cfg.crawl.max_pages, Some(2));
        assert!(cfg.crawl.fetch_details);
        assert!(cfg.crawl.reconcile);
        assert_eq!(cfg.fetch.max_retries, 3);
        assert_eq!(cfg.fetch.retry_interval_ms, 500);
    }

    #[test]
    fn missing_file_means_defaults() {
        let cfg = Config::load("/nonexistent/imoveis-scout.toml").unwrap();
        assert_eq!(cfg.database_path, "imoveis.db");
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "crawl = 3 = 4").unwrap();
        assert!(matches!(Config::load(&path), Err(ScrapeError::ConfigParse { .. })));
    }
}

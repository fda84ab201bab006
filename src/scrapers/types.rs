use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::config::CrawlConfig;
use crate::error::SkipReason;
use crate::models::{Category, PartialRecord};

/// Knobs for a single (site, category) crawl
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Stop after this many result pages
    pub max_pages: Option<u32>,
    /// Enrich each card from its detail page
    pub fetch_details: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            fetch_details: true,
        }
    }
}

impl From<&CrawlConfig> for CrawlOptions {
    fn from(cfg: &CrawlConfig) -> Self {
        Self {
            max_pages: cfg.max_pages,
            fetch_details: cfg.fetch_details,
        }
    }
}

/// Result of handing one record to the store
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Upserted { id: i64, created: bool },
    Skipped(SkipReason),
}

/// Receives each record the crawl driver emits.
pub trait RecordSink: Send {
    fn accept(&mut self, record: PartialRecord) -> UpsertOutcome;
}

/// State of one (site, category) pass. Dropped once reconciliation ran.
#[derive(Debug)]
pub struct CrawlSession {
    pub site: &'static str,
    pub category: Category,
    /// Next results page to fetch (1-based)
    pub page: u32,
    /// Rows upserted during this pass
    pub found_ids: HashSet<i64>,
    pub done: bool,
    /// Stopped at the page cap rather than at the end of results
    pub capped: bool,
    pub cards_seen: usize,
    pub created: usize,
    pub skipped: BTreeMap<String, usize>,
}

impl CrawlSession {
    pub fn new(site: &'static str, category: Category) -> Self {
        Self {
            site,
            category,
            page: 1,
            found_ids: HashSet::new(),
            done: false,
            capped: false,
            cards_seen: 0,
            created: 0,
            skipped: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Upserted { id, created } => {
                self.found_ids.insert(id);
                if created {
                    self.created += 1;
                }
            }
            UpsertOutcome::Skipped(reason) => {
                *self.skipped.entry(reason.to_string()).or_default() += 1;
            }
        }
    }

    pub fn report(&self, deleted: usize) -> PassReport {
        PassReport {
            site: self.site.to_string(),
            category: self.category,
            pages: self.page.saturating_sub(1),
            capped: self.capped,
            cards_seen: self.cards_seen,
            upserted: self.found_ids.len(),
            created: self.created,
            skipped: self.skipped.values().sum(),
            skip_reasons: self.skipped.clone(),
            deleted,
        }
    }
}

/// Summary of a finished (site, category) pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub site: String,
    pub category: Category,
    /// Results pages that yielded cards
    pub pages: u32,
    pub capped: bool,
    pub cards_seen: usize,
    pub upserted: usize,
    pub created: usize,
    pub skipped: usize,
    pub skip_reasons: BTreeMap<String, usize>,
    pub deleted: usize,
}

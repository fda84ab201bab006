use std::str::FromStr;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ScrapeError;
use crate::models::Category;
use crate::scrapers::crawl::CrawlDriver;
use crate::scrapers::fetcher::HttpFetcher;
use crate::scrapers::sites::{SiteAdapterConfig, SiteSelector};
use crate::scrapers::traits::PageSource;
use crate::scrapers::types::{CrawlOptions, CrawlSession, PassReport};
use crate::store::ListingStore;

/// Turn category arguments into categories. `all` (or nothing) means both.
pub fn parse_categories<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Category>, ScrapeError> {
    let mut categories = Vec::new();
    for value in raw {
        let value = value.as_ref().trim();
        if value.eq_ignore_ascii_case("all") {
            return Ok(Category::ALL.to_vec());
        }
        let category = Category::from_str(value)?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    if categories.is_empty() {
        return Ok(Category::ALL.to_vec());
    }
    Ok(categories)
}

/// Crawl every selected site. Sites run in parallel, one task and one
/// HTTP client each; categories within a site run one after another.
pub async fn run(
    selector: SiteSelector,
    categories: &[Category],
    config: &Config,
    store: ListingStore,
) -> Result<Vec<PassReport>, ScrapeError> {
    let options = CrawlOptions::from(&config.crawl);
    let reconcile = config.crawl.reconcile;

    // Build all clients up front so a bad site fails before any request.
    let mut jobs = Vec::new();
    for site in selector.sites() {
        let fetcher = HttpFetcher::new(site.base_url, config.fetch.clone())?;
        jobs.push((site, fetcher));
    }

    let mut set = JoinSet::new();
    for (site, fetcher) in jobs {
        let categories = categories.to_vec();
        let options = options.clone();
        let store = store.clone();
        set.spawn(async move {
            run_site(site, &fetcher, &categories, options, reconcile, &store).await
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(site_reports)) => reports.extend(site_reports),
            Ok(Err(e)) => error!("site job failed: {}", e),
            Err(e) => error!("site job panicked: {}", e),
        }
    }

    reports.sort_by(|a, b| (&a.site, a.category.as_str()).cmp(&(&b.site, b.category.as_str())));
    Ok(reports)
}

/// Run each category pass for one site against any page source.
pub async fn run_site(
    site: &'static SiteAdapterConfig,
    source: &dyn PageSource,
    categories: &[Category],
    options: CrawlOptions,
    reconcile: bool,
    store: &ListingStore,
) -> Result<Vec<PassReport>, ScrapeError> {
    let driver = CrawlDriver::new(site, source, options)?;
    let mut reports = Vec::with_capacity(categories.len());

    for &category in categories {
        let mut session = CrawlSession::new(site.name, category);
        let mut sink = store.sink(site.name);
        driver.run(&mut session, &mut sink).await;

        let deleted = if reconcile && session.capped {
            warn!(
                "[{}] {} pass stopped at the page cap, not reconciling",
                site.display_name, category
            );
            0
        } else if reconcile {
            match store.reconcile(site.name, category, &session.found_ids) {
                Ok(n) => n,
                Err(e) => {
                    warn!("[{}] reconcile failed for {}: {}", site.display_name, category, e);
                    0
                }
            }
        } else {
            0
        };

        let report = session.report(deleted);
        info!(
            "[{}] {}: {} pages, {} cards, {} upserted ({} new), {} skipped, {} deleted",
            site.display_name,
            category,
            report.pages,
            report.cards_seen,
            report.upserted,
            report.created,
            report.skipped,
            report.deleted
        );
        reports.push(report);
    }

    Ok(reports)
}

use tracing::{debug, info, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::models::PartialRecord;
use crate::scrapers::card::CardExtractor;
use crate::scrapers::detail::DetailExtractor;
use crate::scrapers::sites::SiteAdapterConfig;
use crate::scrapers::traits::PageSource;
use crate::scrapers::types::{CrawlOptions, CrawlSession, RecordSink};

/// Walks one site's results pages for one category, enriching each card
/// from its detail page and handing every record to a sink.
///
/// Pages are fetched strictly in order. The pass ends on the first page
/// with no cards or at the page cap; a page that could not be fetched looks
/// the same as the end of results. A capped pass is marked on the session.
pub struct CrawlDriver<'a> {
    site: &'static SiteAdapterConfig,
    source: &'a dyn PageSource,
    cards: CardExtractor,
    details: DetailExtractor,
    options: CrawlOptions,
}

impl<'a> CrawlDriver<'a> {
    pub fn new(
        site: &'static SiteAdapterConfig,
        source: &'a dyn PageSource,
        options: CrawlOptions,
    ) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(site.base_url).map_err(|source| ScrapeError::BaseUrl {
            site: site.name.to_string(),
            source,
        })?;

        Ok(Self {
            site,
            source,
            cards: CardExtractor::new(&site.card, base_url),
            details: DetailExtractor::new(&site.detail),
            options,
        })
    }

    pub async fn run(&self, session: &mut CrawlSession, sink: &mut dyn RecordSink) {
        let name = self.site.display_name;
        info!("[{}] crawling {} listings", name, session.category);

        while !session.done {
            if let Some(cap) = self.options.max_pages {
                if session.page > cap {
                    debug!("[{}] page cap {} reached", name, cap);
                    session.capped = true;
                    session.done = true;
                    break;
                }
            }

            let url = self.site.page_url(session.category, session.page);
            let raw = self.get_document(&url).await;
            let items = self.cards.extract_page(&raw, session.category);

            if items.is_empty() {
                info!("[{}] page {} has no listings, pass complete", name, session.page);
                session.done = true;
                break;
            }

            debug!("[{}] page {}: {} cards", name, session.page, items.len());
            session.cards_seen += items.len();

            for card in items {
                let record = self.enrich(card).await;
                let outcome = sink.accept(record);
                session.record(outcome);
            }

            session.page += 1;
            self.source.polite_delay().await;
        }
    }

    /// Fetch a page, degrading any failure to an empty document.
    async fn get_document(&self, url: &str) -> String {
        match self.source.fetch(url).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[{}] fetch failed for {}: {}", self.site.display_name, url, e);
                String::new()
            }
        }
    }

    /// Merge the detail page onto a card. Detail failures keep the card
    /// as-is.
    async fn enrich(&self, mut card: PartialRecord) -> PartialRecord {
        card.site = Some(self.site.name.to_string());

        if !self.options.fetch_details {
            return card;
        }
        let Some(link) = card.link.clone() else {
            return card;
        };

        match self.details.extract(self.source, &link).await {
            Ok(detail) => {
                card.merge(detail);
                card.site = Some(self.site.name.to_string());
            }
            Err(e) => {
                warn!("[{}] details failed for {}: {}", self.site.display_name, link, e);
            }
        }
        self.source.polite_delay().await;
        card
    }
}

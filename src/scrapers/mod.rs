pub mod card;
pub mod crawl;
pub mod detail;
pub mod fetcher;
pub mod html;
pub mod normalize;
pub mod sites;
pub mod traits;
pub mod types;

pub use crawl::CrawlDriver;
pub use fetcher::HttpFetcher;
pub use sites::{SiteAdapterConfig, SiteSelector, SITES};
pub use traits::PageSource;
pub use types::{CrawlOptions, CrawlSession, PassReport, RecordSink, UpsertOutcome};

use anyhow::Context;
use clap::Parser;
use imoveis_scout::config::{Config, DEFAULT_CONFIG_PATH};
use imoveis_scout::jobs;
use imoveis_scout::models::ListingExport;
use imoveis_scout::scrapers::SiteSelector;
use imoveis_scout::store::ListingStore;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Crawl real-estate listing sites into a local SQLite database
#[derive(Parser, Debug)]
#[command(name = "imoveis-scout", version, about)]
struct Args {
    /// Site to crawl: all, mws, simao or solar
    #[arg(long, default_value = "all")]
    site: String,

    /// Category to crawl: all, venda or locacao (repeatable)
    #[arg(long = "category", default_value = "all")]
    categories: Vec<String>,

    /// Stop each pass after this many results pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Only read listing cards, skip detail pages
    #[arg(long)]
    no_details: bool,

    /// Keep listings that were not seen in this run
    #[arg(long)]
    no_reconcile: bool,

    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write every stored listing to this JSON file when done
    #[arg(long)]
    export: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(max_pages) = args.max_pages {
        config.crawl.max_pages = Some(max_pages);
    }
    if args.no_details {
        config.crawl.fetch_details = false;
    }
    if args.no_reconcile {
        config.crawl.reconcile = false;
    }
    if let Some(db) = &args.db {
        config.database_path = db.display().to_string();
    }

    // Resolve selectors before touching the network
    let selector = SiteSelector::parse(&args.site)?;
    let categories = jobs::parse_categories(args.categories.as_slice())?;

    let store = ListingStore::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;

    info!("🏠 Imóveis Scout");
    info!(
        "Crawling {} site(s), categories: {}",
        selector.sites().len(),
        categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
    );

    let reports = jobs::run(selector, &categories, &config, store.clone()).await?;

    for report in &reports {
        println!(
            "{} / {}: {} pages, {} cards, {} upserted ({} new), {} skipped, {} deleted",
            report.site,
            report.category,
            report.pages,
            report.cards_seen,
            report.upserted,
            report.created,
            report.skipped,
            report.deleted
        );
        for (reason, count) in &report.skip_reasons {
            println!("   skipped {}: {}", reason, count);
        }
    }

    let total = store.count().context("counting listings")?;
    info!("✅ {} listings stored in {}", total, config.database_path);

    if let Some(path) = &args.export {
        let listings = store.list(None, None).context("reading listings")?;
        let export: Vec<ListingExport<'_>> = listings.iter().map(ListingExport::from).collect();
        let json = serde_json::to_string_pretty(&export)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("💾 Exported {} listings to {}", listings.len(), path.display());
    }

    Ok(())
}

//! Listing persistence: idempotent upsert keyed on (site, code, category)
//! and per-pass reconciliation.

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{named_params, params, Connection, OptionalExtension, Result, Row};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{ScrapeError, SkipReason};
use crate::models::{Category, ListingRecord, PartialRecord};
use crate::scrapers::normalize::{normalize_category, squish_opt, union_amenities};
use crate::scrapers::types::{RecordSink, UpsertOutcome};

const FALLBACK_CODE_LEN: usize = 16;

const UPSERT_SQL: &str = "
    INSERT INTO listings (
        site, code, category, title, location, city, link, image, price_brl,
        bedrooms, suites, parking, parking_min, parking_max, bathrooms, half_bathrooms,
        area_m2, private_area_m2, total_area_m2, land_area_m2, common_area_m2,
        condo_fee, condo_installments, property_tax, property_tax_installments,
        furnishing, description, amenities, property_type, created_at, updated_at
    ) VALUES (
        :site, :code, :category, :title, :location, :city, :link, :image, :price_brl,
        :bedrooms, :suites, :parking, :parking_min, :parking_max, :bathrooms, :half_bathrooms,
        :area_m2, :private_area_m2, :total_area_m2, :land_area_m2, :common_area_m2,
        :condo_fee, :condo_installments, :property_tax, :property_tax_installments,
        :furnishing, :description, :amenities, :property_type, :now, :now
    )
    ON CONFLICT(site, code, category) DO UPDATE SET
        title=excluded.title,
        location=excluded.location,
        city=excluded.city,
        link=excluded.link,
        image=excluded.image,
        price_brl=excluded.price_brl,
        bedrooms=excluded.bedrooms,
        suites=excluded.suites,
        parking=excluded.parking,
        parking_min=excluded.parking_min,
        parking_max=excluded.parking_max,
        bathrooms=excluded.bathrooms,
        half_bathrooms=excluded.half_bathrooms,
        area_m2=excluded.area_m2,
        private_area_m2=excluded.private_area_m2,
        total_area_m2=excluded.total_area_m2,
        land_area_m2=excluded.land_area_m2,
        common_area_m2=excluded.common_area_m2,
        condo_fee=excluded.condo_fee,
        condo_installments=excluded.condo_installments,
        property_tax=excluded.property_tax,
        property_tax_installments=excluded.property_tax_installments,
        furnishing=excluded.furnishing,
        description=excluded.description,
        amenities=excluded.amenities,
        property_type=excluded.property_type,
        updated_at=excluded.updated_at";

const SELECT_COLUMNS: &str = "
    id, site, code, category, title, location, city, link, image, price_brl,
    bedrooms, suites, parking, parking_min, parking_max, bathrooms, half_bathrooms,
    area_m2, private_area_m2, total_area_m2, land_area_m2, common_area_m2,
    condo_fee, condo_installments, property_tax, property_tax_installments,
    furnishing, description, amenities, property_type, created_at, updated_at";

/// Stable stand-in code for listings the site gives no code for.
pub fn fallback_code(link: &str) -> String {
    let digest = Sha256::digest(link.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..FALLBACK_CODE_LEN].to_string()
}

/// A record that passed validation and is ready to write
struct ValidRecord {
    site: String,
    code: String,
    category: Category,
    link: String,
    record: PartialRecord,
}

fn validate(mut record: PartialRecord, default_site: &str) -> Result<ValidRecord, SkipReason> {
    let site = record
        .site
        .as_deref()
        .and_then(squish_opt)
        .or_else(|| squish_opt(default_site))
        .ok_or(SkipReason::MissingSite)?;

    let category = match record.category.as_deref() {
        Some(raw) => normalize_category(raw).ok_or_else(|| SkipReason::InvalidCategory(Some(raw.to_string())))?,
        None => return Err(SkipReason::InvalidCategory(None)),
    };

    let link = record
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .ok_or(SkipReason::MissingLink)?;

    let code = record
        .code
        .as_deref()
        .and_then(squish_opt)
        .unwrap_or_else(|| fallback_code(&link));
    if code.is_empty() {
        return Err(SkipReason::MissingCode);
    }

    record.site = Some(site.clone());
    Ok(ValidRecord {
        site,
        code,
        category,
        link,
        record,
    })
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(|v| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    })
}

#[derive(Clone)]
pub struct ListingStore {
    conn: Arc<Mutex<Connection>>,
}

impl ListingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, ScrapeError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ScrapeError> {
        create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-write leaves SQLite consistent; keep going.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate and persist one extracted record. Never fails the caller:
    /// problems come back as `UpsertOutcome::Skipped`.
    pub fn upsert(&self, record: PartialRecord, default_site: &str) -> UpsertOutcome {
        let link_for_log = record.link.clone();
        let valid = match validate(record, default_site) {
            Ok(valid) => valid,
            Err(reason) => {
                warn!("SKIP site={} link={:?}: {}", default_site, link_for_log, reason);
                return UpsertOutcome::Skipped(reason);
            }
        };

        let mut conn = self.lock();
        match write(&mut conn, &valid) {
            Ok((id, created)) => {
                debug!(
                    "UPSERT OK site={} cat={} code={} id={}",
                    valid.site, valid.category, valid.code, id
                );
                UpsertOutcome::Upserted { id, created }
            }
            Err(e) => {
                warn!(
                    "UPSERT FAIL site={} cat={} code={}: {}",
                    valid.site, valid.category, valid.code, e
                );
                UpsertOutcome::Skipped(SkipReason::Persistence(e.to_string()))
            }
        }
    }

    /// Delete every (site, category) row not upserted in the pass that
    /// produced `found_ids`. Returns how many rows went.
    pub fn reconcile(&self, site: &str, category: Category, found_ids: &HashSet<i64>) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let stale: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM listings WHERE site = ?1 AND category = ?2")?;
            let ids = stmt.query_map(params![site, category.as_str()], |row| row.get::<_, i64>(0))?;
            let all = ids.collect::<Result<Vec<_>>>()?;
            all.into_iter().filter(|id| !found_ids.contains(id)).collect()
        };

        {
            let mut delete = tx.prepare("DELETE FROM listings WHERE id = ?1")?;
            for id in &stale {
                delete.execute(params![id])?;
            }
        }
        tx.commit()?;

        if !stale.is_empty() {
            info!(
                "DELETED {} listings not seen this pass (site={}, category={})",
                stale.len(),
                site,
                category
            );
        }
        Ok(stale.len())
    }

    pub fn find(&self, site: &str, code: &str, category: Category) -> Result<Option<ListingRecord>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM listings WHERE site = ?1 AND code = ?2 AND category = ?3",
                SELECT_COLUMNS
            ),
            params![site, code, category.as_str()],
            row_to_listing,
        )
        .optional()
    }

    /// Stored listings, optionally narrowed to one site and/or category.
    pub fn list(&self, site: Option<&str>, category: Option<Category>) -> Result<Vec<ListingRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM listings
             WHERE (?1 IS NULL OR site = ?1) AND (?2 IS NULL OR category = ?2)
             ORDER BY site, category, code",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![site, category.map(|c| c.as_str())], row_to_listing)?;
        let listings = rows.collect::<Result<Vec<_>>>()?;
        Ok(listings)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock();
        conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
    }

    /// A sink that upserts into this store, defaulting records to `site`.
    pub fn sink(&self, site: &'static str) -> StoreSink {
        StoreSink {
            store: self.clone(),
            site,
        }
    }
}

/// Feeds crawl output for one site into a [`ListingStore`].
pub struct StoreSink {
    store: ListingStore,
    site: &'static str,
}

impl RecordSink for StoreSink {
    fn accept(&mut self, record: PartialRecord) -> UpsertOutcome {
        self.store.upsert(record, self.site)
    }
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            site TEXT NOT NULL,
            code TEXT NOT NULL,
            category TEXT NOT NULL CHECK (category IN ('Venda', 'Locação')),
            title TEXT,
            location TEXT,
            city TEXT,
            link TEXT NOT NULL,
            image TEXT,
            price_brl REAL,
            bedrooms INTEGER,
            suites INTEGER,
            parking INTEGER,
            parking_min INTEGER,
            parking_max INTEGER,
            bathrooms INTEGER,
            half_bathrooms INTEGER,
            area_m2 REAL,
            private_area_m2 REAL,
            total_area_m2 REAL,
            land_area_m2 REAL,
            common_area_m2 REAL,
            condo_fee REAL,
            condo_installments INTEGER,
            property_tax REAL,
            property_tax_installments INTEGER,
            furnishing TEXT,
            description TEXT,
            amenities TEXT NOT NULL DEFAULT '[]',
            property_type TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(site, code, category)
        );
        CREATE INDEX IF NOT EXISTS idx_listings_category ON listings(category);
        CREATE INDEX IF NOT EXISTS idx_listings_price ON listings(price_brl);
        CREATE INDEX IF NOT EXISTS idx_listings_location ON listings(location);",
    )
}

/// Find-or-create by natural key, union amenities with the stored set.
fn write(conn: &mut Connection, valid: &ValidRecord) -> Result<(i64, bool)> {
    let tx = conn.transaction()?;

    let existing: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, amenities FROM listings WHERE site = ?1 AND code = ?2 AND category = ?3",
            params![valid.site, valid.code, valid.category.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let previous: BTreeSet<String> = existing
        .as_ref()
        .and_then(|(_, json)| serde_json::from_str(json).ok())
        .unwrap_or_default();
    let amenities = union_amenities(previous, valid.record.amenities.iter().cloned());
    let amenities_json = serde_json::to_string(&amenities)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    let r = &valid.record;
    let now = Utc::now();
    tx.execute(
        UPSERT_SQL,
        named_params! {
            ":site": valid.site,
            ":code": valid.code,
            ":category": valid.category.as_str(),
            ":title": trimmed(&r.title),
            ":location": trimmed(&r.location),
            ":city": trimmed(&r.city),
            ":link": valid.link,
            ":image": trimmed(&r.image),
            ":price_brl": r.price_brl,
            ":bedrooms": r.bedrooms,
            ":suites": r.suites,
            ":parking": r.parking,
            ":parking_min": r.parking_min,
            ":parking_max": r.parking_max,
            ":bathrooms": r.bathrooms,
            ":half_bathrooms": r.half_bathrooms,
            ":area_m2": r.area_m2,
            ":private_area_m2": r.private_area_m2,
            ":total_area_m2": r.total_area_m2,
            ":land_area_m2": r.land_area_m2,
            ":common_area_m2": r.common_area_m2,
            ":condo_fee": r.condo_fee,
            ":condo_installments": r.condo_installments,
            ":property_tax": r.property_tax,
            ":property_tax_installments": r.property_tax_installments,
            ":furnishing": trimmed(&r.furnishing),
            ":description": trimmed(&r.description),
            ":amenities": amenities_json,
            ":property_type": trimmed(&r.property_type),
            ":now": now,
        },
    )?;

    let (id, created) = match existing {
        Some((id, _)) => (id, false),
        None => (tx.last_insert_rowid(), true),
    };
    tx.commit()?;
    Ok((id, created))
}

fn row_to_listing(row: &Row<'_>) -> Result<ListingRecord> {
    let raw_category: String = row.get("category")?;
    let category = normalize_category(&raw_category).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            Box::new(ScrapeError::UnknownCategory(raw_category.clone())),
        )
    })?;
    let amenities_json: String = row.get("amenities")?;

    Ok(ListingRecord {
        id: row.get("id")?,
        site: row.get("site")?,
        code: row.get("code")?,
        category,
        title: row.get("title")?,
        location: row.get("location")?,
        city: row.get("city")?,
        link: row.get("link")?,
        image: row.get("image")?,
        price_brl: row.get("price_brl")?,
        bedrooms: row.get("bedrooms")?,
        suites: row.get("suites")?,
        parking: row.get("parking")?,
        parking_min: row.get("parking_min")?,
        parking_max: row.get("parking_max")?,
        bathrooms: row.get("bathrooms")?,
        half_bathrooms: row.get("half_bathrooms")?,
        area_m2: row.get("area_m2")?,
        private_area_m2: row.get("private_area_m2")?,
        total_area_m2: row.get("total_area_m2")?,
        land_area_m2: row.get("land_area_m2")?,
        common_area_m2: row.get("common_area_m2")?,
        condo_fee: row.get("condo_fee")?,
        condo_installments: row.get("condo_installments")?,
        property_tax: row.get("property_tax")?,
        property_tax_installments: row.get("property_tax_installments")?,
        furnishing: row.get("furnishing")?,
        description: row.get("description")?,
        amenities: serde_json::from_str(&amenities_json).unwrap_or_default(),
        property_type: row.get("property_type")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(code: &str, amenities: &[&str]) -> PartialRecord {
        PartialRecord {
            category: Some("Venda".into()),
            code: Some(code.into()),
            title: Some(format!("Imóvel {}", code)),
            link: Some(format!("https://solarimoveis-rs.com.br/detalhes.php?id={}", code)),
            price_brl: Some(399_000.0),
            amenities: amenities.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    fn upserted_id(outcome: UpsertOutcome) -> i64 {
        match outcome {
            UpsertOutcome::Upserted { id, .. } => id,
            other => panic!("expected upsert, got {:?}", other),
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = ListingStore::open_in_memory().unwrap();
        let first = store.upsert(listing("274", &[]), "solar");
        let second = store.upsert(listing("274", &[]), "solar");

        assert!(matches!(first, UpsertOutcome::Upserted { created: true, .. }));
        assert!(matches!(second, UpsertOutcome::Upserted { created: false, .. }));
        assert_eq!(upserted_id(first), upserted_id(second));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn same_code_in_other_category_is_a_separate_row() {
        let store = ListingStore::open_in_memory().unwrap();
        store.upsert(listing("274", &[]), "solar");
        let mut rental = listing("274", &[]);
        rental.category = Some("aluguel".into());
        store.upsert(rental, "solar");

        assert_eq!(store.count().unwrap(), 2);
        assert!(store.find("solar", "274", Category::Rental).unwrap().is_some());
    }

    #[test]
    fn amenities_only_grow() {
        let store = ListingStore::open_in_memory().unwrap();
        store.upsert(listing("1", &["Piscina"]), "solar");
        store.upsert(listing("1", &[]), "solar");
        let kept = store.find("solar", "1", Category::Sale).unwrap().unwrap();
        assert!(kept.amenities.contains("Piscina"));

        store.upsert(listing("1", &["Churrasqueira"]), "solar");
        let both = store.find("solar", "1", Category::Sale).unwrap().unwrap();
        assert_eq!(
            both.amenities.into_iter().collect::<Vec<_>>(),
            vec!["Churrasqueira".to_string(), "Piscina".to_string()]
        );
    }

    #[test]
    fn later_pass_overwrites_fields() {
        let store = ListingStore::open_in_memory().unwrap();
        store.upsert(listing("1", &[]), "solar");
        let mut cheaper = listing("1", &[]);
        cheaper.price_brl = Some(350_000.0);
        store.upsert(cheaper, "solar");

        let row = store.find("solar", "1", Category::Sale).unwrap().unwrap();
        assert_eq!(row.price_brl, Some(350_000.0));
    }

    #[test]
    fn missing_code_falls_back_to_link_hash() {
        let store = ListingStore::open_in_memory().unwrap();
        let mut record = listing("x", &[]);
        record.code = None;
        let link = record.link.clone().unwrap();

        store.upsert(record.clone(), "solar");
        store.upsert(record, "solar");

        let code = fallback_code(&link);
        assert_eq!(code.len(), 16);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.find("solar", &code, Category::Sale).unwrap().is_some());
    }

    #[test]
    fn invalid_records_are_skipped() {
        let store = ListingStore::open_in_memory().unwrap();

        let mut no_link = listing("1", &[]);
        no_link.link = Some("  ".into());
        assert_eq!(
            store.upsert(no_link, "solar"),
            UpsertOutcome::Skipped(SkipReason::MissingLink)
        );

        let mut bad_category = listing("2", &[]);
        bad_category.category = Some("Temporada".into());
        assert_eq!(
            store.upsert(bad_category, "solar"),
            UpsertOutcome::Skipped(SkipReason::InvalidCategory(Some("Temporada".into())))
        );

        assert_eq!(
            store.upsert(listing("3", &[]), " "),
            UpsertOutcome::Skipped(SkipReason::MissingSite)
        );
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn reconcile_only_touches_its_site_and_category() {
        let store = ListingStore::open_in_memory().unwrap();
        let a = upserted_id(store.upsert(listing("A", &[]), "solar"));
        let b = upserted_id(store.upsert(listing("B", &[]), "solar"));
        store.upsert(listing("C", &[]), "solar");

        let mut rental = listing("C", &[]);
        rental.category = Some("Locação".into());
        store.upsert(rental, "solar");
        store.upsert(listing("C", &[]), "mws");

        let found: HashSet<i64> = [a, b].into_iter().collect();
        let deleted = store.reconcile("solar", Category::Sale, &found).unwrap();

        assert_eq!(deleted, 1);
        assert!(store.find("solar", "C", Category::Sale).unwrap().is_none());
        assert!(store.find("solar", "A", Category::Sale).unwrap().is_some());
        assert!(store.find("solar", "B", Category::Sale).unwrap().is_some());
        assert!(store.find("solar", "C", Category::Rental).unwrap().is_some());
        assert!(store.find("mws", "C", Category::Sale).unwrap().is_some());
    }

    #[test]
    fn lists_by_site_and_category() {
        let store = ListingStore::open_in_memory().unwrap();
        store.upsert(listing("1", &[]), "solar");
        store.upsert(listing("2", &[]), "mws");

        assert_eq!(store.list(None, None).unwrap().len(), 2);
        assert_eq!(store.list(Some("mws"), Some(Category::Sale)).unwrap().len(), 1);
        assert!(store.list(Some("mws"), Some(Category::Rental)).unwrap().is_empty());
    }

    #[test]
    fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imoveis.db");
        {
            let store = ListingStore::open(&path).unwrap();
            store.upsert(listing("9", &["Piscina"]), "simao");
        }
        let reopened = ListingStore::open(&path).unwrap();
        let row = reopened.find("simao", "9", Category::Sale).unwrap().unwrap();
        assert_eq!(row.title.as_deref(), Some("Imóvel 9"));
        assert_eq!(row.formatted_price(), "R$ 399.000,00");
    }
}

//! Listing cards on a results page.
//!
//! One generic extractor; what differs per site lives in [`CardSelectors`].

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use tracing::debug;
use url::Url;

use crate::models::{Category, PartialRecord};
use crate::scrapers::html;
use crate::scrapers::normalize::{derive_city, parse_brl, parse_brl_amount, parse_decimal, parse_int};
use crate::scrapers::sites::CardSelectors;

static BADGE_RENTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)loca[cç][ãa]o").unwrap());
static BADGE_SALE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)vendas?").unwrap());
static BADGE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)c[oó]d\.?\s*im[oó]vel\s*:?\s*(\d+)").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

static BEDROOMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)quartos?|dormit[oó]rios?").unwrap());
static SUITES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)su[ií]tes?").unwrap());
static PARKING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)vagas?").unwrap());
static BATHROOMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)banheiros?").unwrap());
static LABELED_AREA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)área\s+(privativa|total)").unwrap());
static AREA_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([\d.,]+)\s*m²?").unwrap());
static CONDO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)condom[ií]nio").unwrap());
static IPTU: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\biptu\b").unwrap());
static BARE_AREA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([\d.,]+)\s*m²").unwrap());

/// Reads search-result cards into partial records.
pub struct CardExtractor {
    selectors: &'static CardSelectors,
    base_url: Url,
}

impl CardExtractor {
    pub fn new(selectors: &'static CardSelectors, base_url: Url) -> Self {
        Self {
            selectors,
            base_url,
        }
    }

    /// Parse a results page and extract every real listing card on it.
    pub fn extract_page(&self, raw: &str, category_hint: Category) -> Vec<PartialRecord> {
        let doc = html::parse(raw);
        html::select_all(doc.root_element(), self.selectors.item)
            .into_iter()
            .filter_map(|node| self.extract(node, category_hint))
            .collect()
    }

    /// Extract one card. Cards with neither title nor link (ad slots and
    /// the like) yield `None`.
    pub fn extract(&self, node: ElementRef<'_>, category_hint: Category) -> Option<PartialRecord> {
        let title = html::first_text_of(node, self.selectors.title);
        let link = self.extract_link(node);
        if title.is_none() && link.is_none() {
            debug!("skipping card without title or link");
            return None;
        }

        let location = html::first_text_of(node, self.selectors.location);
        let mut record = PartialRecord {
            category: Some(self.extract_category(node, category_hint).as_str().to_string()),
            code: self.extract_code(node),
            title,
            city: location.as_deref().and_then(derive_city),
            location,
            link,
            image: self.extract_image(node),
            price_brl: self.extract_price(node),
            ..Default::default()
        };
        self.extract_details(node, &mut record);

        Some(record)
    }

    fn badge(&self, node: ElementRef<'_>) -> Option<String> {
        html::first_text(node, self.selectors.badge)
    }

    fn extract_category(&self, node: ElementRef<'_>, hint: Category) -> Category {
        match self.badge(node) {
            Some(badge) if BADGE_RENTAL.is_match(&badge) => Category::Rental,
            Some(badge) if BADGE_SALE.is_match(&badge) => Category::Sale,
            _ => hint,
        }
    }

    fn extract_code(&self, node: ElementRef<'_>) -> Option<String> {
        let from_badge = self
            .badge(node)
            .and_then(|badge| BADGE_CODE.captures(&badge).map(|c| c[1].to_string()));
        if from_badge.is_some() {
            return from_badge;
        }

        self.selectors.code.iter().find_map(|css| {
            html::first_text(node, css)
                .and_then(|text| DIGITS.captures(&text).map(|c| c[1].to_string()))
        })
    }

    fn extract_link(&self, node: ElementRef<'_>) -> Option<String> {
        self.selectors
            .link
            .iter()
            .find_map(|css| html::first_attr(node, css, "href"))
            .map(|href| self.absolutize(&href))
    }

    fn absolutize(&self, href: &str) -> String {
        self.base_url
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }

    fn extract_image(&self, node: ElementRef<'_>) -> Option<String> {
        html::first_attr(node, self.selectors.image, "src")
            .or_else(|| html::first_attr(node, self.selectors.image, "data-src"))
    }

    fn extract_price(&self, node: ElementRef<'_>) -> Option<f64> {
        self.selectors
            .price
            .iter()
            .find_map(|css| html::first_text(node, css).and_then(|text| parse_brl(&text)))
    }

    /// Bedrooms, bathrooms, parking, area and fees from the card's icon list.
    /// Label text wins; icon hints only fill what text left empty.
    fn extract_details(&self, node: ElementRef<'_>, record: &mut PartialRecord) {
        for css in self.selectors.details {
            for li in html::select_all(node, css) {
                let text = html::text(li);
                let span_text = html::first_text(li, "span");
                let icon_class = html::first_attr(li, "i", "class").unwrap_or_default();

                apply_label_text(record, &text, span_text.as_deref());
                apply_icon_hint(record, &icon_class, &text);
            }
        }
    }
}

fn apply_label_text(record: &mut PartialRecord, text: &str, span_text: Option<&str>) {
    let value = span_text.unwrap_or(text);
    let lower = text.to_lowercase();

    if BEDROOMS.is_match(&lower) {
        record.bedrooms = parse_int(value);
    } else if SUITES.is_match(&lower) {
        record.suites = parse_int(value);
    } else if PARKING.is_match(&lower) {
        record.parking = parse_int(value);
    } else if BATHROOMS.is_match(&lower) {
        record.bathrooms = parse_int(value);
    } else if LABELED_AREA.is_match(&lower) {
        if let Some(caps) = AREA_VALUE.captures(value) {
            record.area_m2 = parse_decimal(&caps[1]);
        }
    } else if CONDO.is_match(&lower) {
        if let Some(amount) = parse_brl_amount(value) {
            record.condo_fee = Some(amount.value);
            record.condo_installments = amount.installments;
        }
    } else if IPTU.is_match(&lower) {
        if let Some(amount) = parse_brl_amount(value) {
            record.property_tax = Some(amount.value);
            record.property_tax_installments = amount.installments;
        }
    } else if let Some(caps) = BARE_AREA.captures(&lower) {
        if record.area_m2.is_none() {
            record.area_m2 = parse_decimal(&caps[1]);
        }
    }
}

fn apply_icon_hint(record: &mut PartialRecord, icon_class: &str, text: &str) {
    let slot = if icon_class.contains("flaticon-bed") {
        &mut record.bedrooms
    } else if icon_class.contains("flaticon-clean") {
        &mut record.bathrooms
    } else if icon_class.contains("flaticon-car") {
        &mut record.parking
    } else {
        return;
    };

    if slot.is_none() {
        *slot = parse_int(text);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ScrapeError;
use crate::scrapers::normalize::format_brl;

/// Listing category: sale or rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Venda")]
    Sale,
    #[serde(rename = "Locação")]
    Rental,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Rental, Category::Sale];

    /// Canonical persisted value
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sale => "Venda",
            Category::Rental => "Locação",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::scrapers::normalize::normalize_category(s)
            .ok_or_else(|| ScrapeError::UnknownCategory(s.to_string()))
    }
}

/// Whatever one extraction step managed to read about a listing.
///
/// Card and detail extraction both produce one of these; `merge` lays the
/// detail page on top of the card. Every field is optional because the
/// sites drop markup freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub site: Option<String>,
    /// Raw category text, normalized at upsert time
    pub category: Option<String>,
    pub code: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub price_brl: Option<f64>,
    pub bedrooms: Option<u32>,
    pub suites: Option<u32>,
    pub parking: Option<u32>,
    pub parking_min: Option<u32>,
    pub parking_max: Option<u32>,
    pub bathrooms: Option<u32>,
    pub half_bathrooms: Option<u32>,
    pub area_m2: Option<f64>,
    pub private_area_m2: Option<f64>,
    pub total_area_m2: Option<f64>,
    pub land_area_m2: Option<f64>,
    pub common_area_m2: Option<f64>,
    pub condo_fee: Option<f64>,
    pub condo_installments: Option<u32>,
    pub property_tax: Option<f64>,
    pub property_tax_installments: Option<u32>,
    pub furnishing: Option<String>,
    pub description: Option<String>,
    pub amenities: Vec<String>,
    pub property_type: Option<String>,
}

macro_rules! overlay {
    ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field;
            }
        )+
    };
}

impl PartialRecord {
    /// Overlay `other` onto `self`; present values in `other` win.
    pub fn merge(&mut self, other: PartialRecord) {
        overlay!(
            self, other, site, category, code, title, location, city, link, image, price_brl,
            bedrooms, suites, parking, parking_min, parking_max, bathrooms, half_bathrooms,
            area_m2, private_area_m2, total_area_m2, land_area_m2, common_area_m2, condo_fee,
            condo_installments, property_tax, property_tax_installments, furnishing,
            description, property_type,
        );
        if !other.amenities.is_empty() {
            self.amenities = other.amenities;
        }
    }
}

/// Persisted listing, unique on (site, code, category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: i64,
    pub site: String,
    pub code: String,
    pub category: Category,
    pub title: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub link: String,
    pub image: Option<String>,
    pub price_brl: Option<f64>,
    pub bedrooms: Option<u32>,
    pub suites: Option<u32>,
    pub parking: Option<u32>,
    pub parking_min: Option<u32>,
    pub parking_max: Option<u32>,
    pub bathrooms: Option<u32>,
    pub half_bathrooms: Option<u32>,
    pub area_m2: Option<f64>,
    pub private_area_m2: Option<f64>,
    pub total_area_m2: Option<f64>,
    pub land_area_m2: Option<f64>,
    pub common_area_m2: Option<f64>,
    pub condo_fee: Option<f64>,
    pub condo_installments: Option<u32>,
    pub property_tax: Option<f64>,
    pub property_tax_installments: Option<u32>,
    pub furnishing: Option<String>,
    pub description: Option<String>,
    pub amenities: BTreeSet<String>,
    pub property_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingRecord {
    pub fn formatted_price(&self) -> String {
        match self.price_brl {
            Some(value) => format!("R$ {}", format_brl(value)),
            None => "Preço indisponível".to_string(),
        }
    }

    pub fn formatted_condo_fee(&self) -> Option<String> {
        self.condo_fee
            .map(|value| with_installments(value, self.condo_installments))
    }

    pub fn formatted_property_tax(&self) -> Option<String> {
        self.property_tax
            .map(|value| with_installments(value, self.property_tax_installments))
    }
}

/// Export shape of a listing: every stored field plus the money fields
/// rendered for display.
#[derive(Debug, Serialize)]
pub struct ListingExport<'a> {
    #[serde(flatten)]
    pub listing: &'a ListingRecord,
    pub price_formatted: String,
    pub condo_fee_formatted: Option<String>,
    pub property_tax_formatted: Option<String>,
}

impl<'a> From<&'a ListingRecord> for ListingExport<'a> {
    fn from(listing: &'a ListingRecord) -> Self {
        Self {
            price_formatted: listing.formatted_price(),
            condo_fee_formatted: listing.formatted_condo_fee(),
            property_tax_formatted: listing.formatted_property_tax(),
            listing,
        }
    }
}

fn with_installments(value: f64, installments: Option<u32>) -> String {
    match installments {
        Some(n) => format!("{}x de R$ {}", n, format_brl(value)),
        None => format!("R$ {}", format_brl(value)),
    }
}

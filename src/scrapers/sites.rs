//! Per-site adapter table.
//!
//! Each supported site is a `SiteAdapterConfig` value: base URL, category
//! paths, pagination pattern, and the selector lists the generic card and
//! detail extractors walk in priority order. Adding a site means adding a
//! value here.

use crate::error::ScrapeError;
use crate::models::Category;

/// Selectors for one search-result card, each list in priority order
#[derive(Debug, Clone, Copy)]
pub struct CardSelectors {
    /// A single listing card on the results page
    pub item: &'static str,
    /// Badge text carrying category and "Cód. imóvel NNN"
    pub badge: &'static str,
    pub code: &'static [&'static str],
    pub title: &'static [&'static str],
    pub location: &'static [&'static str],
    pub link: &'static [&'static str],
    pub image: &'static str,
    pub price: &'static [&'static str],
    /// `li` entries of the bedrooms/bathrooms/parking/area block
    pub details: &'static [&'static str],
}

/// Selectors for a listing's own page
#[derive(Debug, Clone, Copy)]
pub struct DetailSelectors {
    pub title: &'static str,
    /// Breadcrumb-like links carrying category and code
    pub meta: &'static [&'static str],
    pub widget_title: &'static str,
    pub address: &'static str,
    pub feature_item: &'static str,
    pub feature_label: &'static str,
    pub feature_value: &'static str,
    /// Section headings ("Descrição do Imóvel", "Áreas do imóvel", ...)
    pub section_heading: &'static str,
    pub amenity_container_class: &'static str,
    pub amenity_items: &'static [&'static str],
    pub amenity_sections: &'static [&'static str],
    /// Values at or below this are not prices when found by the
    /// any-element "R$" fallback
    pub price_floor: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SiteAdapterConfig {
    /// Stored site identifier
    pub name: &'static str,
    /// Log prefix
    pub display_name: &'static str,
    pub base_url: &'static str,
    pub sale_path: &'static str,
    pub rental_path: &'static str,
    /// Appended to the category path, followed by the page number
    pub page_query: &'static str,
    pub card: CardSelectors,
    pub detail: DetailSelectors,
}

impl SiteAdapterConfig {
    pub fn path_for(&self, category: Category) -> &'static str {
        match category {
            Category::Sale => self.sale_path,
            Category::Rental => self.rental_path,
        }
    }

    /// Relative URL of results page `page` (1-based).
    pub fn page_url(&self, category: Category, page: u32) -> String {
        format!("{}{}{}", self.path_for(category), self.page_query, page)
    }
}

const CARD_DEFAULTS: CardSelectors = CardSelectors {
    item: ".ltn__product-item",
    badge: ".product-badge li",
    code: &[".product-badge .code_style", ".product-badge span"],
    title: &[".imov-title a", ".product-title a"],
    location: &[".product-img-location li a", ".imov-title a"],
    link: &[".imov-title a", ".product-img a", ".product-title a"],
    image: ".product-img img",
    price: &[
        ".product-price .venda",
        ".product-price .locacao",
        ".product-info-bottom .product-price",
        ".product-price",
    ],
    details: &[
        ".ltn__plot-brief li",
        "ul.ltn__list-item-2--- li",
        ".property-details li",
    ],
};

const DETAIL_DEFAULTS: DetailSelectors = DetailSelectors {
    title: "h1",
    meta: &[
        ".ltn__blog-category a",
        ".ltn__blog-meta .ltn__blog-category a",
        ".ltn__blog-meta a",
    ],
    widget_title: ".widget h4.ltn__widget-title, .ltn__widget-title",
    address: "h1 ~ label",
    feature_item: ".property-detail-feature-list .property-detail-feature-list-item",
    feature_label: "h6",
    feature_value: "small",
    section_heading: "h4.title-2",
    amenity_container_class: "property-details-amenities",
    amenity_items: &["label.checkbox-item", ".ltn__menu-widget ul li"],
    amenity_sections: &[
        "Características do Imóvel",
        "Características do Condomínio",
        "Infraestrutura do Condomínio",
        "Próximidades",
        "Proximidades",
    ],
    price_floor: 1000.0,
};

pub const MWS: SiteAdapterConfig = SiteAdapterConfig {
    name: "mws",
    display_name: "MWS",
    base_url: "https://mws-rs.com.br/",
    sale_path: "imoveis-para-venda.php",
    rental_path: "imoveis-para-locacao.php",
    page_query: "?pagina=",
    card: CardSelectors {
        title: &[".product-title a", ".imov-title a"],
        link: &[".product-title a", ".product-img a", ".imov-title a"],
        price: &[".product-info-bottom .product-price", ".product-price"],
        ..CARD_DEFAULTS
    },
    detail: DETAIL_DEFAULTS,
};

pub const SIMAO: SiteAdapterConfig = SiteAdapterConfig {
    name: "simao",
    display_name: "Simao",
    base_url: "https://www.simaoimoveis.com.br/",
    sale_path: "imoveis-para-venda.php",
    rental_path: "imoveis-para-locacao.php",
    page_query: "?&pagina=",
    card: CardSelectors {
        title: &[".product-title a", ".imov-title a"],
        link: &[".product-img a", ".product-title a", ".imov-title a"],
        details: &["ul.ltn__list-item-2--- li", ".ltn__plot-brief li"],
        ..CARD_DEFAULTS
    },
    detail: DETAIL_DEFAULTS,
};

pub const SOLAR: SiteAdapterConfig = SiteAdapterConfig {
    name: "solar",
    display_name: "Solar",
    base_url: "https://solarimoveis-rs.com.br/",
    sale_path: "imoveis-para-venda.php",
    rental_path: "imoveis-para-locacao.php",
    page_query: "?pagina=",
    card: CARD_DEFAULTS,
    detail: DETAIL_DEFAULTS,
};

pub static SITES: &[SiteAdapterConfig] = &[MWS, SIMAO, SOLAR];

/// Look a site up by identifier or display name.
pub fn lookup(name: &str) -> Result<&'static SiteAdapterConfig, ScrapeError> {
    SITES
        .iter()
        .find(|site| site.name.eq_ignore_ascii_case(name) || site.display_name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ScrapeError::UnknownSite(name.to_string()))
}

/// Which sites a run covers
#[derive(Debug, Clone, Copy)]
pub enum SiteSelector {
    All,
    One(&'static SiteAdapterConfig),
}

impl SiteSelector {
    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        if raw.eq_ignore_ascii_case("all") {
            Ok(SiteSelector::All)
        } else {
            lookup(raw).map(SiteSelector::One)
        }
    }

    pub fn sites(&self) -> Vec<&'static SiteAdapterConfig> {
        match self {
            SiteSelector::All => SITES.iter().collect(),
            SiteSelector::One(site) => vec![*site],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_page_urls_per_site() {
        assert_eq!(SOLAR.page_url(Category::Sale, 1), "imoveis-para-venda.php?pagina=1");
        assert_eq!(SIMAO.page_url(Category::Rental, 3), "imoveis-para-locacao.php?&pagina=3");
    }

    #[test]
    fn unknown_site_is_a_configuration_error() {
        assert!(matches!(lookup("zap"), Err(ScrapeError::UnknownSite(name)) if name == "zap"));
        assert!(matches!(SiteSelector::parse("ALL"), Ok(SiteSelector::All)));
        assert_eq!(SiteSelector::parse("Solar").unwrap().sites()[0].name, "solar");
        assert_eq!(SiteSelector::All.sites().len(), 3);
    }
}

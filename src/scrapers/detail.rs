//! Listing detail pages.
//!
//! Every field has its own lookup and fallbacks; a miss leaves the field
//! empty and the card's value in place after merging.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::FetchError;
use crate::models::{Category, PartialRecord};
use crate::scrapers::html;
use crate::scrapers::normalize::{
    city_from_address, derive_city, normalize_parking_range, parse_brl, parse_brl_amount,
    parse_decimal, parse_int, squish, BrlAmount,
};
use crate::scrapers::sites::DetailSelectors;
use crate::scrapers::traits::PageSource;

static SALE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)venda").unwrap());
static RENTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)loca").unwrap());
static CODE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)c[oó]d").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());
static PRICE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)valor\s+(do\s+)?(aluguel|venda|im[oó]vel)").unwrap());
static PRICE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)valor do im[oó]vel").unwrap());
static AREAS_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[ÁÃáa]reas do im[oó]vel").unwrap());
static DESCRIPTION_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)descri[cç][ãa]o do im[oó]vel").unwrap());
static FURNISHED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)mobiliad").unwrap());
static FURNISHING_AMENITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(mobiliad|mobili[aá]do|sem\s+mobil|mobil[ií]a)").unwrap());
static HALF_BATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)lavabo").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d.,]+").unwrap());
static TITLE_CITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[Ee]m\s+(\p{Lu}[\p{L}\s-]*)").unwrap());
static MONEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"R\$\s*(\d[\d.,]*)").unwrap());
static CHECKMARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\x{2713}\s*").unwrap());
static TRAILING_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*<br>\s*$").unwrap());
static INPUT_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)input.*$").unwrap());

/// Label/value pairs from a page's feature list, in page order.
#[derive(Debug, Default)]
struct FeatureList(Vec<(String, String)>);

impl FeatureList {
    /// Value of the last entry whose label matches any of `labels`,
    /// trying `labels` in order.
    fn get(&self, labels: &[&str]) -> Option<&str> {
        labels.iter().find_map(|wanted| {
            self.0
                .iter()
                .rev()
                .find(|(label, _)| label.to_lowercase() == wanted.to_lowercase())
                .map(|(_, value)| value.as_str())
        })
    }

    fn get_int(&self, labels: &[&str]) -> Option<u32> {
        self.get(labels).and_then(parse_int)
    }

    fn get_money(&self, labels: &[&str]) -> Option<BrlAmount> {
        self.get(labels).and_then(parse_brl_amount)
    }

    fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Default, PartialEq)]
struct Areas {
    private: Option<f64>,
    built: Option<f64>,
    total: Option<f64>,
    land: Option<f64>,
    common: Option<f64>,
}

/// Reads a listing's own page.
pub struct DetailExtractor {
    selectors: &'static DetailSelectors,
}

impl DetailExtractor {
    pub fn new(selectors: &'static DetailSelectors) -> Self {
        Self { selectors }
    }

    /// Fetch `url` and extract it.
    pub async fn extract(&self, source: &dyn PageSource, url: &str) -> Result<PartialRecord, FetchError> {
        let raw = source.fetch(url).await?;
        Ok(self.parse(&raw))
    }

    /// Extract every detail field from raw page markup.
    pub fn parse(&self, raw: &str) -> PartialRecord {
        let doc = html::parse(raw);
        let root = doc.root_element();
        let s = self.selectors;

        let features = self.feature_list(root);
        let description = self.description(root);
        let amenities = self.amenities(root);
        let all_amenity_text = self.all_amenity_text(root);
        let title = html::first_text(root, s.title);

        let parking_text = features.get(&["Garagens", "Vagas"]);
        let (parking_min, parking_max) = parking_text
            .map(normalize_parking_range)
            .unwrap_or((None, None));
        let condo = features.get_money(&["Condomínio", "Condominio"]);
        let tax = features.get_money(&["IPTU"]);
        let areas = self.areas(root);
        let location = self.location(root);

        PartialRecord {
            category: self.category(root).map(|c| c.as_str().to_string()),
            code: self.code(root),
            city: location
                .as_deref()
                .and_then(city_from_address)
                .or_else(|| title.as_deref().and_then(city_from_title)),
            location,
            price_brl: self.price(root, &features),
            bedrooms: features.get_int(&["Dormitórios", "Dormitorios", "Quartos"]),
            suites: features.get_int(&["Suítes", "Suites"]),
            bathrooms: features.get_int(&["Banheiros"]),
            half_bathrooms: features
                .get_int(&["Lavabo", "Lavabos"])
                .or_else(|| all_amenity_text.iter().any(|t| HALF_BATH.is_match(t)).then_some(1)),
            parking: features.get_int(&["Garagens", "Vagas"]),
            parking_min,
            parking_max,
            condo_fee: condo.map(|a| a.value),
            condo_installments: condo.and_then(|a| a.installments),
            property_tax: tax.map(|a| a.value),
            property_tax_installments: tax.and_then(|a| a.installments),
            property_type: features
                .get(&["Tipo do imóvel", "Tipo de imóvel"])
                .map(str::to_string),
            furnishing: furnishing(&features, title.as_deref(), description.as_deref(), &all_amenity_text),
            area_m2: areas.private.or(areas.built).or(areas.total),
            private_area_m2: areas.private,
            total_area_m2: areas.total,
            land_area_m2: areas.land,
            common_area_m2: areas.common,
            title,
            description,
            amenities,
            ..Default::default()
        }
    }

    fn meta_texts(&self, root: ElementRef<'_>, css: &str) -> Vec<String> {
        html::select_all(root, css).into_iter().map(html::text).collect()
    }

    fn category(&self, root: ElementRef<'_>) -> Option<Category> {
        for css in self.selectors.meta {
            let hit = self
                .meta_texts(root, css)
                .into_iter()
                .find(|t| SALE.is_match(t) || RENTAL.is_match(t));
            match hit {
                Some(t) if SALE.is_match(&t) => return Some(Category::Sale),
                Some(_) => return Some(Category::Rental),
                None => {}
            }
        }

        let widget = html::first_text(root, self.selectors.widget_title)?;
        if SALE.is_match(&widget) {
            Some(Category::Sale)
        } else if RENTAL.is_match(&widget) {
            Some(Category::Rental)
        } else {
            None
        }
    }

    fn code(&self, root: ElementRef<'_>) -> Option<String> {
        self.selectors.meta.iter().find_map(|css| {
            self.meta_texts(root, css)
                .into_iter()
                .find(|t| CODE_LABEL.is_match(t))
                .and_then(|t| DIGITS.captures(&t).map(|c| c[1].to_string()))
        })
    }

    /// Street address, trimmed to start at "Rua" or to its last two parts.
    fn location(&self, root: ElementRef<'_>) -> Option<String> {
        let text = html::first_text(root, self.selectors.address)?;

        if let Some(pos) = text.find("Rua") {
            return Some(text[pos..].trim().to_string());
        }
        let parts: Vec<&str> = text.split(" - ").collect();
        if parts.len() > 1 {
            Some(format!("{} - {}", parts[parts.len() - 2], parts[parts.len() - 1]))
        } else {
            Some(text)
        }
    }

    /// Labeled feature entry, then the "valor do imóvel" heading, then any
    /// element with "R$" whose value clears the plausibility floor.
    fn price(&self, root: ElementRef<'_>, features: &FeatureList) -> Option<f64> {
        let labeled = features
            .0
            .iter()
            .filter(|(label, _)| PRICE_LABEL.is_match(label))
            .find_map(|(_, value)| parse_brl(value));
        if labeled.is_some() {
            return labeled;
        }

        let heading = html::select_all(root, "h4")
            .into_iter()
            .map(html::text)
            .find(|t| PRICE_HEADING.is_match(t))
            .and_then(|t| money_values(&t).next());
        if heading.is_some() {
            return heading;
        }

        html::select_all(root, "*")
            .into_iter()
            .map(html::text)
            .find_map(|t| money_values(&t).find(|value| *value > self.selectors.price_floor))
    }

    fn feature_list(&self, root: ElementRef<'_>) -> FeatureList {
        FeatureList(
            html::select_all(root, self.selectors.feature_item)
                .into_iter()
                .filter_map(|item| self.label_value(item))
                .collect(),
        )
    }

    fn label_value(&self, item: ElementRef<'_>) -> Option<(String, String)> {
        let label = html::first_text(item, self.selectors.feature_label)?;
        let value = html::first_text(item, self.selectors.feature_value)?;
        Some((label, value))
    }

    fn section_headings<'a>(&self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        html::select_all(root, self.selectors.section_heading)
    }

    fn is_section_break(el: ElementRef<'_>) -> bool {
        html::is_heading(el) || html::class_contains(el, "title-2")
    }

    fn areas(&self, root: ElementRef<'_>) -> Areas {
        let mut areas = Areas::default();

        let anchor = self
            .section_headings(root)
            .into_iter()
            .find(|h| AREAS_HEADING.is_match(&html::text(*h)));
        let Some(anchor) = anchor else {
            return areas;
        };

        let container = html::following_siblings(anchor)
            .take_while(|el| !html::is_heading(*el))
            .find(|el| html::class_contains(*el, "property-detail-feature-list"));
        let Some(container) = container else {
            return areas;
        };

        for item in html::select_all(container, ".property-detail-feature-list-item") {
            let Some((label, value)) = self.label_value(item) else {
                continue;
            };
            let label = label.to_lowercase();
            let Some(num) = NUMBER.find(&value).and_then(|m| parse_decimal(m.as_str())) else {
                continue;
            };

            if label.contains("privativa") {
                areas.private = Some(num);
            } else if label.contains("constru") {
                areas.built = Some(num);
            } else if label.contains("total") {
                areas.total = Some(num);
            } else if label.contains("terreno") {
                areas.land = Some(num);
            } else if label.contains("comum") {
                areas.common = Some(areas.common.unwrap_or(0.0) + num);
            }
        }

        areas
    }

    /// Paragraphs and lists between the description heading and the next
    /// heading, separated by blank lines.
    fn description(&self, root: ElementRef<'_>) -> Option<String> {
        let anchor = self
            .section_headings(root)
            .into_iter()
            .find(|h| DESCRIPTION_HEADING.is_match(&html::text(*h)))?;

        let parts: Vec<String> = html::following_siblings(anchor)
            .take_while(|el| !Self::is_section_break(*el))
            .filter_map(|el| match el.value().name() {
                "p" => Some(html::text(el)),
                "ul" => Some(list_content(el)),
                _ => None,
            })
            .filter(|part| !part.is_empty())
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Amenities from every named section, deduplicated and sorted.
    fn amenities(&self, root: ElementRef<'_>) -> Vec<String> {
        let mut found = BTreeSet::new();
        let headings = self.section_headings(root);

        for section in self.selectors.amenity_sections {
            let wanted = section.to_lowercase();
            for heading in &headings {
                if !html::text(*heading).to_lowercase().contains(&wanted) {
                    continue;
                }
                let Some(container) = self.amenity_container(*heading) else {
                    continue;
                };
                for css in self.selectors.amenity_items {
                    for el in html::select_all(container, css) {
                        let clean = clean_amenity(&html::text(el));
                        if !clean.is_empty() {
                            found.insert(clean);
                        }
                    }
                }
            }
        }

        found.into_iter().collect()
    }

    fn amenity_container<'a>(&self, heading: ElementRef<'a>) -> Option<ElementRef<'a>> {
        let by_class = html::following_siblings(heading)
            .take_while(|el| !Self::is_section_break(*el))
            .find(|el| html::class_contains(*el, self.selectors.amenity_container_class));
        if by_class.is_some() {
            return by_class;
        }

        html::following_siblings(heading)
            .next()
            .filter(|next| html::select_first(*next, ".ltn__menu-widget ul li").is_some())
    }

    /// Every amenity-looking text on the page, regardless of section.
    fn all_amenity_text(&self, root: ElementRef<'_>) -> Vec<String> {
        let scoped = format!(".{} label.checkbox-item", self.selectors.amenity_container_class);
        [scoped.as_str(), ".ltn__menu-widget ul li"]
            .iter()
            .flat_map(|css| html::select_all(root, css))
            .map(|el| clean_amenity(&html::text(el)))
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// First furnishing mention: feature values, page title, description, then
/// amenities. Lower-cased.
fn furnishing(
    features: &FeatureList,
    title: Option<&str>,
    description: Option<&str>,
    amenity_text: &[String],
) -> Option<String> {
    let found = features
        .values()
        .chain(title)
        .chain(description)
        .find(|v| FURNISHED.is_match(v))
        .or_else(|| {
            amenity_text
                .iter()
                .map(String::as_str)
                .find(|t| FURNISHING_AMENITY.is_match(t))
        });

    if found.is_none() {
        debug!("no furnishing mention");
    }
    found.map(str::to_lowercase)
}

/// Render a `ul` as bullet lines; nested lists become indented dashes.
fn list_content(ul: ElementRef<'_>) -> String {
    html::children_named(ul, "li")
        .filter_map(|li| {
            let nested: Vec<ElementRef<'_>> = html::children_named(li, "ul").collect();
            if nested.is_empty() {
                let text = html::text(li);
                return (!text.is_empty()).then(|| format!("• {}", text));
            }

            let mut lines = vec![format!("• {}", html::own_text(li))];
            for sub in nested {
                for sub_li in html::select_all(sub, "li") {
                    lines.push(format!("  - {}", html::text(sub_li)));
                }
            }
            Some(lines.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_amenity(text: &str) -> String {
    let t = CHECKMARK.replace(text, "");
    let t = TRAILING_BR.replace(&t, "");
    let t = INPUT_TAIL.replace(&t, "");
    squish(&t)
}

/// "Casa em Passo Fundo" -> "Passo Fundo"
fn city_from_title(title: &str) -> Option<String> {
    TITLE_CITY.captures(title).and_then(|caps| derive_city(&caps[1]))
}

/// Every "R$ amount" in a run of text, in order.
fn money_values(text: &str) -> impl Iterator<Item = f64> + '_ {
    MONEY.captures_iter(text).filter_map(|caps| parse_brl(&caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::sites::SOLAR;

    const SOLAR_DETAIL: &str = r##"
        <html><body>
          <div class="ltn__blog-meta">
            <ul>
              <li class="ltn__blog-category"><a href="#">Cód: 274</a></li>
              <li class="ltn__blog-category"><a class="bg-orange" href="#">VENDA</a></li>
            </ul>
          </div>
          <h1>Apartamento no bairro Copas Verdes</h1>
          <label>
            <span class="ltn__secondary-color"><i class="flaticon-pin"></i></span>
            Rua Theobaldo Rossi - Copas Verdes - Erechim - RS
          </label>
          <div class="property-detail-feature-list clearfix mb-45">
            <ul>
              <li><div class="property-detail-feature-list-item">
                <img src="predio.png"><div><h6>Condomínio</h6><small>R$ 500,00</small></div>
              </div></li>
              <li><div class="property-detail-feature-list-item">
                <img src="iptu.png"><div><h6>IPTU</h6><small>R$ 1.200,00</small></div>
              </div></li>
              <li><div class="property-detail-feature-list-item">
                <div><h6>Garagens</h6><small>1 ou 2</small></div>
              </div></li>
            </ul>
            <h4 class="mt-3 mb-0 ltn__widget-title ltn__widget-title-border-2">
              Valor do imóvel:<br>
              R$ 399.000,00
            </h4>
          </div>
          <h4 class="title-2">Descrição do Imóvel</h4>
          <p>MEDIDOR DE AGUA INDIVIDUAL</p>
          <ul>
            <li>Sala ampla</li>
            <li>Cozinha <ul><li>armários</li><li>cooktop</li></ul></li>
          </ul>
          <h4 class="title-2">Características do Imóvel</h4>
          <div class="property-details-amenities mb-60">
            <div class="ltn__menu-widget">
              <ul>
                <li><img src="c.png"><label class="checkbox-item p-0">Acabamento em Gesso</label></li>
                <li><img src="c.png"><label class="checkbox-item p-0">mobiliado</label></li>
              </ul>
            </div>
          </div>
        </body></html>
    "##;

    fn solar() -> DetailExtractor {
        DetailExtractor::new(&SOLAR.detail)
    }

    #[test]
    fn reads_solar_detail_page() {
        let r = solar().parse(SOLAR_DETAIL);

        assert_eq!(r.title.as_deref(), Some("Apartamento no bairro Copas Verdes"));
        assert_eq!(r.category.as_deref(), Some("Venda"));
        assert_eq!(r.code.as_deref(), Some("274"));
        assert_eq!(
            r.location.as_deref(),
            Some("Rua Theobaldo Rossi - Copas Verdes - Erechim - RS")
        );
        assert_eq!(r.condo_fee, Some(500.0));
        assert_eq!(r.property_tax, Some(1200.0));
        assert_eq!(r.price_brl, Some(399_000.0));
        assert_eq!(r.parking, Some(1));
        assert_eq!((r.parking_min, r.parking_max), (Some(1), Some(2)));
        assert_eq!(r.furnishing.as_deref(), Some("mobiliado"));
        assert_eq!(
            r.amenities,
            vec!["Acabamento em Gesso".to_string(), "mobiliado".to_string()]
        );
    }

    #[test]
    fn city_comes_from_address_then_title() {
        assert_eq!(solar().parse(SOLAR_DETAIL).city.as_deref(), Some("Erechim"));

        let slashed = r#"<h1>Casa</h1><label>Rua Theobaldo Rossi - Copas Verdes - Erechim/RS</label>"#;
        assert_eq!(solar().parse(slashed).city.as_deref(), Some("Erechim"));

        let titled = r#"<h1>Casa em Passo Fundo</h1>"#;
        assert_eq!(solar().parse(titled).city.as_deref(), Some("Passo Fundo"));
    }

    #[test]
    fn renders_description_with_nested_lists() {
        let r = solar().parse(SOLAR_DETAIL);
        assert_eq!(
            r.description.as_deref(),
            Some("MEDIDOR DE AGUA INDIVIDUAL\n\n• Sala ampla\n• Cozinha\n  - armários\n  - cooktop")
        );
    }

    #[test]
    fn labeled_price_beats_heading() {
        let page = r#"
            <div class="property-detail-feature-list">
              <div class="property-detail-feature-list-item"><h6>Valor do aluguel</h6><small>R$ 2.300,00</small></div>
            </div>
            <h4>Valor do imóvel: R$ 500.000,00</h4>
        "#;
        assert_eq!(solar().parse(page).price_brl, Some(2300.0));
    }

    #[test]
    fn any_element_price_respects_floor() {
        let page = r#"<div><span>Taxa R$ 50,00</span></div><p>Por apenas R$ 250.000,00</p>"#;
        assert_eq!(solar().parse(page).price_brl, Some(250_000.0));

        let cheap = r#"<div><span>Taxa R$ 50,00</span></div>"#;
        assert_eq!(solar().parse(cheap).price_brl, None);
    }

    #[test]
    fn reads_area_section() {
        let page = r#"
            <h4 class="title-2">Áreas do imóvel</h4>
            <div class="property-detail-feature-list">
              <div class="property-detail-feature-list-item"><h6>Área privativa</h6><small>85,5 m²</small></div>
              <div class="property-detail-feature-list-item"><h6>Área total</h6><small>120 m²</small></div>
              <div class="property-detail-feature-list-item"><h6>Área terreno</h6><small>300 m²</small></div>
              <div class="property-detail-feature-list-item"><h6>Área comum</h6><small>10 m²</small></div>
              <div class="property-detail-feature-list-item"><h6>Área comum coberta</h6><small>5,5 m²</small></div>
            </div>
            <h4 class="title-2">Descrição do Imóvel</h4>
        "#;
        let r = solar().parse(page);
        assert_eq!(r.area_m2, Some(85.5));
        assert_eq!(r.private_area_m2, Some(85.5));
        assert_eq!(r.total_area_m2, Some(120.0));
        assert_eq!(r.land_area_m2, Some(300.0));
        assert_eq!(r.common_area_m2, Some(15.5));
    }

    #[test]
    fn feature_counts_and_fallbacks() {
        let page = r#"
            <div class="ltn__widget-title">Imóvel para locação</div>
            <div class="property-detail-feature-list">
              <div class="property-detail-feature-list-item"><h6>Quartos</h6><small>3</small></div>
              <div class="property-detail-feature-list-item"><h6>Suítes</h6><small>1</small></div>
              <div class="property-detail-feature-list-item"><h6>Banheiros</h6><small>2</small></div>
              <div class="property-detail-feature-list-item"><h6>Vagas</h6><small>2 ou mais</small></div>
              <div class="property-detail-feature-list-item"><h6>Condomínio</h6><small>Consulte</small></div>
              <div class="property-detail-feature-list-item"><h6>IPTU</h6><small>10x de R$ 120,00</small></div>
              <div class="property-detail-feature-list-item"><h6>Tipo do imóvel</h6><small>Casa</small></div>
            </div>
            <div class="ltn__menu-widget"><ul><li>Lavabo</li><li>Semi-mobiliado</li></ul></div>
        "#;
        let r = solar().parse(page);
        assert_eq!(r.category.as_deref(), Some("Locação"));
        assert_eq!(r.bedrooms, Some(3));
        assert_eq!(r.suites, Some(1));
        assert_eq!(r.bathrooms, Some(2));
        assert_eq!(r.half_bathrooms, Some(1));
        assert_eq!((r.parking_min, r.parking_max), (Some(2), None));
        assert_eq!(r.condo_fee, None);
        assert_eq!(r.property_tax, Some(120.0));
        assert_eq!(r.property_tax_installments, Some(10));
        assert_eq!(r.property_type.as_deref(), Some("Casa"));
        assert_eq!(r.furnishing.as_deref(), Some("semi-mobiliado"));
    }

    #[test]
    fn empty_page_yields_empty_record() {
        let r = solar().parse("");
        assert_eq!(r, PartialRecord::default());
    }

    #[test]
    fn cleans_amenity_text() {
        assert_eq!(clean_amenity("\u{2713} Piscina"), "Piscina");
        assert_eq!(clean_amenity("Churrasqueira <br>"), "Churrasqueira");
        assert_eq!(clean_amenity("Sacada input type=checkbox"), "Sacada");
    }
}

//! Locale-aware field normalization.
//!
//! Every function here is pure. Unparsable input yields `None`, which callers
//! treat as "field absent".

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

use crate::models::Category;

static CONSULT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)consulte").unwrap());
static INSTALLMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)x\s+de\s+R?\$?\s*([\d.,]+)").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static OPEN_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:ou\s+mais|\+)").unwrap());
static DASH_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(?:-|a)\s*(\d+)").unwrap());
static OR_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s+ou\s+(\d+)").unwrap());
static UF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:/[A-Z]{2}|\s*-\s*[A-Z]{2})$").unwrap());
static PAREN_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)$").unwrap());

/// A currency amount, optionally quoted as "Nx de R$ amount"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrlAmount {
    pub value: f64,
    pub installments: Option<u32>,
}

/// Collapse whitespace runs to single spaces and trim.
pub fn squish(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Like [`squish`] but maps blank results to `None`.
pub fn squish_opt(text: &str) -> Option<String> {
    let s = squish(text);
    (!s.is_empty()).then_some(s)
}

/// Parse a Brazilian-formatted money string ("R$ 1.500,00").
pub fn parse_brl(text: &str) -> Option<f64> {
    parse_brl_amount(text).map(|amount| amount.value)
}

/// Parse money text, keeping the installment count when the text reads
/// "12x de R$ 100,00". "Consulte" placeholders are absent values.
pub fn parse_brl_amount(text: &str) -> Option<BrlAmount> {
    let text = text.trim();
    if text.is_empty() || CONSULT.is_match(text) {
        return None;
    }

    if let Some(caps) = INSTALLMENTS.captures(text) {
        let installments = caps[1].parse().ok();
        return parse_decimal(&caps[2]).map(|value| BrlAmount { value, installments });
    }

    let value = parse_decimal(text);
    if value.is_none() {
        debug!("unparsable currency text: {:?}", text);
    }
    value.map(|value| BrlAmount {
        value,
        installments: None,
    })
}

/// Parse a decimal with Brazilian separators ("1.500,75", "85,5 m²").
///
/// With both separators present `.` groups thousands and `,` is the decimal
/// mark; a lone `,` is the decimal mark.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let mut s: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    if s.contains(',') && s.contains('.') {
        s = s.replace('.', "").replacen(',', ".", 1);
    } else if s.contains(',') {
        s = s.replacen(',', ".", 1);
    }

    s.parse::<f64>().ok()
}

/// First run of digits as an integer.
pub fn parse_int(text: &str) -> Option<u32> {
    DIGITS.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Map category synonyms onto the two canonical categories.
pub fn normalize_category(raw: &str) -> Option<Category> {
    match raw.trim().to_lowercase().as_str() {
        "locação" | "locacao" | ":locacao" | "aluguel" | "rent" | "rental" => Some(Category::Rental),
        "venda" | ":venda" | "sale" => Some(Category::Sale),
        _ => None,
    }
}

/// Read a parking count that may be a range: "1 ou 2", "1-2", "2 ou mais",
/// "3+", "3". Open-ended ranges have no max.
pub fn normalize_parking_range(text: &str) -> (Option<u32>, Option<u32>) {
    let text = text.trim();
    if text.is_empty() {
        return (None, None);
    }

    if let Some(caps) = OPEN_RANGE.captures(text) {
        return (caps[1].parse().ok(), None);
    }
    if let Some(caps) = DASH_RANGE.captures(text).or_else(|| OR_RANGE.captures(text)) {
        return (caps[1].parse().ok(), caps[2].parse().ok());
    }
    match parse_int(text) {
        Some(n) => (Some(n), Some(n)),
        None => (None, None),
    }
}

/// Set union of two amenity lists.
pub fn union_amenities<I, J>(current: I, incoming: J) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
    J: IntoIterator<Item = String>,
{
    current
        .into_iter()
        .chain(incoming)
        .filter(|a| !a.trim().is_empty())
        .collect()
}

/// City part of a free-text location: "Centro, Erechim/RS" -> "Erechim".
pub fn derive_city(location: &str) -> Option<String> {
    let text = squish(location);
    let candidate = text.rsplit(',').next().unwrap_or(&text);
    let candidate = squish(candidate);
    let candidate = UF_SUFFIX.replace(&candidate, "");
    let candidate = PAREN_SUFFIX.replace(&candidate, "");
    squish_opt(&candidate)
}

/// City part of a detail-page address, where the city is the last dashed
/// segment: "Rua X - Copas Verdes - Erechim/RS" -> "Erechim".
pub fn city_from_address(address: &str) -> Option<String> {
    let text = squish(address);
    let text = UF_SUFFIX.replace(&text, "");
    let last = text.rsplit('-').next().unwrap_or(&text);
    derive_city(last)
}

/// Render a value as "399.000,00".
pub fn format_brl(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, dec_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{},{}", sign, grouped, dec_part)
}

//! Thin query layer over `scraper`.
//!
//! `Html::parse_document` never fails; broken markup just yields a sparse
//! tree, so every query here returns `Option`/empty instead of erroring.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::normalize::{squish, squish_opt};

pub fn parse(raw: &str) -> Html {
    Html::parse_document(raw)
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("invalid selector {:?}: {:?}", css, e);
            None
        }
    }
}

/// First element under `scope` matching `css`.
pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    let found = scope.select(&sel).next();
    found
}

/// All elements under `scope` matching `css`, in document order.
pub fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    let found = scope.select(&sel).collect();
    found
}

/// Squished text content of an element.
pub fn text(el: ElementRef<'_>) -> String {
    squish(&el.text().collect::<String>())
}

/// Squished text of the first match, if non-blank.
pub fn first_text(scope: ElementRef<'_>, css: &str) -> Option<String> {
    select_first(scope, css).and_then(|el| squish_opt(&el.text().collect::<String>()))
}

/// First non-blank text among `selectors`, tried in order.
pub fn first_text_of(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| first_text(scope, css))
}

/// Attribute of the first match.
pub fn first_attr(scope: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    select_first(scope, css)
        .and_then(|el| el.value().attr(attr))
        .and_then(squish_opt)
}

/// Text held directly by the element, ignoring nested elements.
pub fn own_text(el: ElementRef<'_>) -> String {
    let raw: Vec<&str> = el
        .children()
        .filter_map(|node| node.value().as_text().map(|t| &**t))
        .collect();
    squish(&raw.join(" "))
}

/// Element siblings after `el`, in order.
pub fn following_siblings<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.next_siblings().filter_map(ElementRef::wrap)
}

/// Direct element children with the given tag name.
pub fn children_named<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == name)
}

pub fn is_heading(el: ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Whether the element's class attribute contains `needle` anywhere.
pub fn class_contains(el: ElementRef<'_>, needle: &str) -> bool {
    el.value()
        .attr("class")
        .map(|c| c.contains(needle))
        .unwrap_or(false)
}

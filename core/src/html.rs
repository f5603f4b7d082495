use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

pub const MAX_IMAGES: usize = 5;

lazy_static! {
    static ref SEL_TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref SEL_A: Selector = Selector::parse("a[href]").expect("valid selector");
    static ref SEL_IMG: Selector = Selector::parse("img[src]").expect("valid selector");
    static ref SEL_P: Selector = Selector::parse("p").expect("valid selector");
}

/// What the crawler keeps from a fetched page besides the raw body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub title: String,
    /// Absolute http(s) URLs without fragments, first occurrence order.
    pub links: Vec<String>,
    pub images: Vec<String>,
    pub first_paragraph: String,
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut u = Url::parse(href).or_else(|_| base.ok_or(url::ParseError::RelativeUrlWithoutBase)?.join(href)).ok()?;
    if !matches!(u.scheme(), "http" | "https") {
        return None;
    }
    u.set_fragment(None);
    Some(u)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract_page(page_url: &str, body: &[u8]) -> PageInfo {
    let base = Url::parse(page_url).ok();
    let html = String::from_utf8_lossy(body);
    let doc = Html::parse_document(&html);

    let title = doc
        .select(&SEL_TITLE)
        .next()
        .map(|n| collapse_whitespace(&n.text().collect::<String>()))
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let links = doc
        .select(&SEL_A)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|h| resolve(base.as_ref(), h))
        .map(|u| u.to_string())
        .filter(|u| seen.insert(u.clone()))
        .collect();

    let images = doc
        .select(&SEL_IMG)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| resolve(base.as_ref(), src))
        .map(|u| u.to_string())
        .take(MAX_IMAGES)
        .collect();

    let first_paragraph = doc
        .select(&SEL_P)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    PageInfo { title, links, images, first_paragraph }
}

fn skipped(el: &ElementRef) -> bool {
    matches!(el.value().name(), "script" | "style" | "head" | "noscript" | "template")
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    out.push_str(t);
                    out.push(' ');
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !skipped(&child_el) {
                        collect_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Text a reader would see: everything outside script, style and head.
pub fn visible_text(body: &[u8]) -> String {
    let html = String::from_utf8_lossy(body);
    let doc = Html::parse_document(&html);
    let mut out = String::new();
    collect_text(doc.root_element(), &mut out);
    out
}

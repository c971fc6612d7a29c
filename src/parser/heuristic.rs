use super::{clean_text, extract_dates, slugify};
use crate::constants::CUSTOM_REGION;
use crate::types::PerformanceEvent;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Candidate containers, most specific first.
const CANDIDATE_SELECTORS: [&str; 18] = [
    "[itemtype*='schema.org/Event']",
    "[class*='event']",
    "[class*='Event']",
    "[class*='performance']",
    "[class*='Performance']",
    "[class*='show']",
    "[class*='Show']",
    "[class*='schedule']",
    "[class*='Schedule']",
    "[class*='calendar']",
    "[class*='Calendar']",
    "[class*='season']",
    "[class*='Season']",
    "[class*='production']",
    "[class*='Production']",
    "article",
    "[data-date]",
    "[datetime]",
];

static CANDIDATES: Lazy<Vec<Selector>> = Lazy::new(|| {
    CANDIDATE_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, strong, b, .title, [class*='title'], [class*='name']")
        .expect("valid selector")
});
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("valid selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

const MIN_TEXT_LEN: usize = 10;
const MAX_TEXT_LEN: usize = 2000;

/// Scan the DOM with the candidate selectors; only the first selector that
/// yields any event is used.
pub fn parse_heuristic_dom(document: &Html, source_url: &str) -> Vec<PerformanceEvent> {
    let base = Url::parse(source_url).ok();

    for selector in CANDIDATES.iter() {
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for (index, element) in document.select(selector).enumerate() {
            let Some(event) = event_from_element(element, index, source_url, base.as_ref()) else {
                continue;
            };
            let key = format!("{}|{}", event.title, event.dates.join(","));
            if seen.insert(key) {
                events.push(event);
            }
        }

        if !events.is_empty() {
            return events;
        }
    }

    Vec::new()
}

fn event_from_element(
    element: ElementRef<'_>,
    index: usize,
    source_url: &str,
    base: Option<&Url>,
) -> Option<PerformanceEvent> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    let text_len = text.chars().count();
    if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&text_len) {
        return None;
    }

    let mut dates = extract_dates(text);
    if dates.is_empty() {
        for attr in ["datetime", "data-date"] {
            if let Some(value) = element.value().attr(attr) {
                dates.push(value.to_string());
            }
        }
    }

    let title = element_title(element)?;
    if dates.is_empty() {
        return None;
    }

    let link = element_link(element, base).unwrap_or_else(|| source_url.to_string());
    let mut event = PerformanceEvent::new(
        format!("dom_{}_{}", slugify(&title), index),
        title,
        dates,
        link,
    );
    event.region = CUSTOM_REGION.to_string();
    Some(event)
}

fn element_title(element: ElementRef<'_>) -> Option<String> {
    if let Some(heading) = element.select(&TITLE_SELECTOR).next() {
        let title = clean_text(&heading.text().collect::<String>());
        if !title.is_empty() {
            return Some(title);
        }
    }

    let anchor = element.select(&ANCHOR_SELECTOR).next()?;
    let title = clean_text(&anchor.text().collect::<String>());
    let len = title.chars().count();
    (len > 3 && len < 200).then_some(title)
}

/// First usable link in the element; root-relative paths resolve against the page origin.
///
/// Protocol-relative links (`//host/path`) name their own host and only borrow the page's scheme.
fn element_link(element: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let href = element.select(&LINK_SELECTOR).next()?.value().attr("href")?.trim();
    if href.is_empty() || href == "#" {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base.map_or("https", |b| b.scheme());
        return Url::parse(&format!("{}://{}", scheme, rest)).ok().map(String::from);
    }
    if href.starts_with('/') {
        let origin = base?.origin();
        if !origin.is_tuple() {
            return None;
        }
        return Url::parse(&origin.ascii_serialization())
            .and_then(|o| o.join(href))
            .ok()
            .map(String::from);
    }
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    None
}

use super::{clean_text, extract_dates, slugify};
use crate::constants::CUSTOM_REGION;
use crate::types::PerformanceEvent;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static OG_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// One page-level pseudo-event from Open Graph or document metadata.
pub fn parse_meta_fallback(document: &Html, source_url: &str) -> Vec<PerformanceEvent> {
    let title = meta_content(document, &OG_TITLE).or_else(|| {
        document
            .select(&TITLE)
            .next()
            .map(|t| clean_text(&t.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    });
    let Some(title) = title else {
        return Vec::new();
    };

    let description = meta_content(document, &OG_DESCRIPTION)
        .or_else(|| meta_content(document, &META_DESCRIPTION))
        .unwrap_or_default();

    let dates = extract_dates(&format!("{} {}", title, description));
    let mut event = PerformanceEvent::new(
        format!("meta_{}", slugify(&title)),
        title,
        dates,
        source_url.to_string(),
    );
    event.region = CUSTOM_REGION.to_string();
    vec![event]
}

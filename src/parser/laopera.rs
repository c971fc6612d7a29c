use super::{clean_text, slugify, VenueParser};
use crate::constants::{LA_OPERA_CODE, LA_OPERA_ORIGIN, LA_OPERA_VENUE_NAME};
use crate::error::Result;
use crate::types::PerformanceEvent;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info};

static EVENT_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".calendar__event-item").expect("valid selector"));
static GRID_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".calendar__grid-item").expect("valid selector"));
static GRID_EVENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".calendar__grid-event").expect("valid selector"));
static TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".uppercase.text-sm.font-bold a").expect("valid selector"));
static TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".uppercase.text-xs.font-medium").expect("valid selector"));

/// LA Opera's calendar page: a list view of `.calendar__event-item` entries,
/// with a month grid as the fallback layout.
pub struct LaOperaParser;

impl Default for LaOperaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LaOperaParser {
    pub fn new() -> Self {
        Self
    }

    fn build_event(&self, item: ElementRef<'_>, date: &str) -> Option<(String, PerformanceEvent)> {
        let title_link = item.select(&TITLE_LINK).next()?;
        let title = clean_text(&title_link.text().collect::<String>());
        if title.is_empty() {
            return None;
        }

        let time = item
            .select(&TIME)
            .next()
            .map(|t| clean_text(&t.text().collect::<String>()))
            .unwrap_or_default();

        let mut link = title_link.value().attr("href").unwrap_or_default().to_string();
        if link.starts_with('/') {
            link = format!("{}{}", LA_OPERA_ORIGIN, link);
        }

        let full_date = if time.is_empty() {
            date.to_string()
        } else {
            format!("{} {}", date, time)
        };

        let key = format!("{}|{}|{}", date, title, time);
        let mut event = PerformanceEvent::new(
            format!("{}_{}_{}", LA_OPERA_CODE, slugify(&title), slugify(&full_date)),
            title,
            vec![full_date],
            link,
        );
        event.venue_code = LA_OPERA_CODE.to_string();
        event.venue_name = LA_OPERA_VENUE_NAME.to_string();
        event.city = "Los Angeles".to_string();
        event.state = "CA".to_string();
        Some((key, event))
    }
}

impl VenueParser for LaOperaParser {
    fn venue_code(&self) -> &'static str {
        LA_OPERA_CODE
    }

    fn parse(&self, html: &str, _source_url: &str) -> Result<Vec<PerformanceEvent>> {
        let document = Html::parse_document(html);
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for item in document.select(&EVENT_ITEM) {
            let date = item.value().attr("data-date").unwrap_or_default();
            if let Some((key, event)) = self.build_event(item, date) {
                if seen.insert(key) {
                    events.push(event);
                }
            }
        }

        if events.is_empty() {
            debug!("no list items found; trying calendar grid layout");
            for cell in document.select(&GRID_ITEM) {
                let date = cell.value().attr("data-key").unwrap_or_default();
                for item in cell.select(&GRID_EVENT) {
                    if let Some((key, event)) = self.build_event(item, date) {
                        if seen.insert(key) {
                            events.push(event);
                        }
                    }
                }
            }
        }

        info!("Successfully parsed {} events from LA Opera", events.len());
        Ok(events)
    }
}

use super::slugify;
use crate::constants::CUSTOM_REGION;
use crate::types::PerformanceEvent;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

static LD_JSON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});

/// schema.org types accepted as events
const EVENT_TYPES: [&str; 6] = [
    "Event",
    "MusicEvent",
    "TheaterEvent",
    "DanceEvent",
    "Festival",
    "ScreeningEvent",
];

/// Events declared in `application/ld+json` blocks.
pub fn parse_json_ld(document: &Html, source_url: &str) -> Vec<PerformanceEvent> {
    let mut events = Vec::new();

    for script in document.select(&LD_JSON_SELECTOR) {
        let text = script.text().collect::<String>();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "skipping unparseable ld+json block");
                continue;
            }
        };

        match value {
            Value::Object(obj) => {
                events.extend(event_from_ld(&obj, source_url));
                if let Some(Value::Array(graph)) = obj.get("@graph") {
                    events.extend(
                        graph
                            .iter()
                            .filter_map(Value::as_object)
                            .filter_map(|item| event_from_ld(item, source_url)),
                    );
                }
            }
            Value::Array(items) => {
                events.extend(
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .filter_map(|item| event_from_ld(item, source_url)),
                );
            }
            _ => {}
        }
    }

    events
}

fn is_event_type(obj: &Map<String, Value>) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => EVENT_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| EVENT_TYPES.contains(&t)),
        _ => false,
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn event_from_ld(obj: &Map<String, Value>, source_url: &str) -> Option<PerformanceEvent> {
    if !is_event_type(obj) {
        return None;
    }
    let name = str_field(obj, "name")?;

    let dates: Vec<String> = ["startDate", "endDate"]
        .iter()
        .filter_map(|key| str_field(obj, key))
        .map(str::to_string)
        .collect();

    let location = match obj.get("location") {
        Some(Value::Array(locations)) => locations.iter().find_map(Value::as_object),
        Some(other) => other.as_object(),
        None => None,
    };

    let mut venue_name = String::new();
    let mut city = String::new();
    let mut state = String::new();
    if let Some(loc) = location {
        venue_name = str_field(loc, "name").unwrap_or_default().to_string();
        match loc.get("address") {
            Some(Value::Object(addr)) => {
                city = str_field(addr, "addressLocality").unwrap_or_default().to_string();
                state = str_field(addr, "addressRegion").unwrap_or_default().to_string();
            }
            Some(Value::String(addr)) => city = addr.trim().to_string(),
            _ => {}
        }
    }

    let event_url = str_field(obj, "url").unwrap_or(source_url).to_string();
    let event_id = format!("ld_{}_{}", slugify(name), slugify(&dates.join("_")));

    let mut event = PerformanceEvent::new(event_id, name.to_string(), dates, event_url);
    event.venue_name = venue_name;
    event.city = city;
    event.state = state;
    event.region = CUSTOM_REGION.to_string();
    Some(event)
}

//! HTML → event extraction.
//!
//! Pages from venues with a dedicated parser go straight to it. Everything
//! else runs through the generic strategies in priority order; the first one
//! to produce events wins and later strategies are never evaluated.

pub mod dates;
pub mod fuzzy;
pub mod heuristic;
pub mod json_ld;
pub mod laopera;
pub mod meta;

use crate::constants::{LA_OPERA_CODE, STRATEGY_HEURISTIC, STRATEGY_JSON_LD, STRATEGY_META, STRATEGY_NONE};
use crate::error::Result;
use crate::types::{Extraction, PerformanceEvent};
use scraper::Html;
use std::collections::HashMap;
use tracing::debug;

pub use dates::extract_dates;
pub use fuzzy::{fuzzy_match_title, TitleMatch};

/// A parser tailored to one venue's markup.
pub trait VenueParser: Send + Sync {
    fn venue_code(&self) -> &'static str;

    fn parse(&self, html: &str, source_url: &str) -> Result<Vec<PerformanceEvent>>;
}

type Strategy = fn(&Html, &str) -> Vec<PerformanceEvent>;

/// Generic strategies, highest confidence first.
const STRATEGIES: [(&str, Strategy); 3] = [
    (STRATEGY_JSON_LD, json_ld::parse_json_ld),
    (STRATEGY_HEURISTIC, heuristic::parse_heuristic_dom),
    (STRATEGY_META, meta::parse_meta_fallback),
];

/// Run the generic strategies against a page and keep the first non-empty result.
pub fn parse_generic_events(html: &str, source_url: &str) -> Extraction {
    let document = Html::parse_document(html);

    for (name, strategy) in STRATEGIES {
        let events = strategy(&document, source_url);
        if !events.is_empty() {
            debug!(strategy = name, count = events.len(), "generic extraction succeeded");
            return Extraction {
                events,
                strategy: name.to_string(),
            };
        }
    }

    Extraction {
        events: Vec::new(),
        strategy: STRATEGY_NONE.to_string(),
    }
}

/// Lowercase ASCII slug used in derived event ids.
pub fn slugify(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .take(40)
        .collect()
}

/// Collapse runs of whitespace in element text.
pub(crate) fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Venue parsers keyed by exact venue code.
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn VenueParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserRegistry {
    /// Registry with the built-in venue parsers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(laopera::LaOperaParser::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(&mut self, parser: Box<dyn VenueParser>) {
        self.parsers.insert(parser.venue_code().to_string(), parser);
    }

    pub fn get(&self, venue_code: &str) -> Option<&dyn VenueParser> {
        self.parsers.get(venue_code).map(|p| p.as_ref())
    }

    /// Venue parser when one is registered for the code, generic extraction otherwise.
    pub fn extract(&self, venue_code: &str, html: &str, source_url: &str) -> Result<Extraction> {
        match self.get(venue_code) {
            Some(parser) => {
                let events = parser.parse(html, source_url)?;
                Ok(Extraction {
                    events,
                    strategy: format!("venue:{}", parser.venue_code()),
                })
            }
            None => Ok(parse_generic_events(html, source_url)),
        }
    }
}

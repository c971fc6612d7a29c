use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single performance (or run of performances) scraped from a venue page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvent {
    pub event_id: String,
    #[serde(default)]
    pub venue_code: String,
    #[serde(default)]
    pub region: String,
    #[serde(rename = "opera_title")]
    pub title: String,
    #[serde(default)]
    pub composer: String,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub venue_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub scraped_at: String,
}

impl PerformanceEvent {
    pub fn new(event_id: String, title: String, dates: Vec<String>, source_url: String) -> Self {
        Self {
            event_id,
            title,
            dates,
            source_url,
            scraped_at: scraped_at_now(),
            ..Default::default()
        }
    }
}

/// RFC 3339 timestamp, second precision
pub fn scraped_at_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Events plus the name of the strategy that produced them
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub events: Vec<PerformanceEvent>,
    pub strategy: String,
}

/// One entry of the append-only ad-hoc sources index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSource {
    pub url: String,
    pub label: String,
    pub scraped_at: String,
    pub event_count: usize,
}

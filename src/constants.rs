/// Default user agent sent to venue sites and robots.txt endpoints
pub const DEFAULT_USER_AGENT: &str = "ViolettaOperaGraph/1.0 (research project)";

// Extraction strategy names reported alongside parsed events
pub const STRATEGY_JSON_LD: &str = "json-ld";
pub const STRATEGY_HEURISTIC: &str = "heuristic";
pub const STRATEGY_META: &str = "meta";
pub const STRATEGY_NONE: &str = "none";

// Venue codes with dedicated parsers
pub const LA_OPERA_CODE: &str = "laopera";
pub const LA_OPERA_ORIGIN: &str = "https://www.laopera.org";
pub const LA_OPERA_VENUE_NAME: &str = "Dorothy Chandler Pavilion";

/// Region tag for events scraped from ad-hoc URLs
pub const CUSTOM_REGION: &str = "custom";
pub const SOURCES_INDEX_FILE: &str = "sources.json";

/// Minimum fuzzy score for a title to count as a match
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.6;

pub const ROBOTS_FETCH_TIMEOUT_SECS: u64 = 10;
pub const RENDER_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a robots.txt Crawl-delay we will honor
pub const MAX_CRAWL_DELAY_SECS: u64 = 60;

// Environment overrides for the CLI and server
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const CONFIG_PATH_ENV: &str = "SCRAPER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

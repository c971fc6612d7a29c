use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Most matches taken from a single grammar
const MAX_MATCHES_PER_PATTERN: usize = 10;

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // 2024-05-01
        r"\d{4}-\d{2}-\d{2}",
        // May 3, 2024
        r"(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4}",
        // Sep 5 2024
        r"(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2},?\s+\d{4}",
        // 3 May 2024
        r"\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}",
        // 5/3/2024
        r"\d{1,2}/\d{1,2}/\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("date pattern compiles"))
    .collect()
});

/// Date-like substrings of `text`, grammar by grammar, first-seen order, no repeats.
pub fn extract_dates(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dates = Vec::new();

    for pattern in DATE_PATTERNS.iter() {
        for found in pattern.find_iter(text).take(MAX_MATCHES_PER_PATTERN) {
            let date = found.as_str();
            if seen.insert(date.to_string()) {
                dates.push(date.to_string());
            }
        }
    }

    dates
}

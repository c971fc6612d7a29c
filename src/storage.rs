use crate::constants::{CUSTOM_REGION, SOURCES_INDEX_FILE};
use crate::error::Result;
use crate::types::{CustomSource, PerformanceEvent};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// File-backed event output.
///
/// Layout under the data directory:
/// - `data/raw/regional/<region>/<venue>_<YYYYMMDD>.json`
/// - `data/raw/custom/<label>_<YYYYMMDD_HHMMSS>.json`
/// - `data/raw/custom/sources.json` (append-only index of ad-hoc scrapes)
pub struct EventStore {
    data_dir: PathBuf,
    index_lock: Mutex<()>,
}

impl EventStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("data").join("raw")
    }

    pub fn regional_dir(&self, region: &str) -> PathBuf {
        self.raw_dir().join("regional").join(region)
    }

    pub fn custom_dir(&self) -> PathBuf {
        self.raw_dir().join(CUSTOM_REGION)
    }

    fn write_json(path: &Path, events: &[PerformanceEvent]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json_content = serde_json::to_string_pretty(events)?;
        fs::write(path, json_content)?;
        Ok(())
    }

    /// Persist one venue's events for a run date, replacing any earlier file for that day.
    pub fn write_venue_events(
        &self,
        region: &str,
        venue_code: &str,
        run_date: NaiveDate,
        events: &[PerformanceEvent],
    ) -> Result<PathBuf> {
        let filename = format!("{}_{}.json", venue_code, run_date.format("%Y%m%d"));
        let path = self.regional_dir(region).join(filename);
        Self::write_json(&path, events)?;
        Ok(path)
    }

    pub fn write_custom_events(
        &self,
        label: &str,
        scraped_at: NaiveDateTime,
        events: &[PerformanceEvent],
    ) -> Result<PathBuf> {
        let filename = format!(
            "{}_{}.json",
            safe_label(label),
            scraped_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.custom_dir().join(filename);
        Self::write_json(&path, events)?;
        Ok(path)
    }

    pub fn load_sources(&self) -> Result<Vec<CustomSource>> {
        let path = self.custom_dir().join(SOURCES_INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn append_source(&self, source: CustomSource) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sources = self.load_sources()?;
        sources.push(source);

        let dir = self.custom_dir();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(SOURCES_INDEX_FILE), serde_json::to_string_pretty(&sources)?)?;
        Ok(())
    }

    /// Every persisted event, optionally limited to one region (`custom` for ad-hoc scrapes).
    ///
    /// Events without a region inherit the directory they were found in.
    /// Unreadable files are skipped.
    pub fn load_events(&self, region_filter: Option<&str>) -> Result<Vec<PerformanceEvent>> {
        let mut all_events = Vec::new();

        let regional_root = self.raw_dir().join("regional");
        for region_dir in sorted_entries(&regional_root)? {
            if !region_dir.is_dir() {
                continue;
            }
            let region = file_name(&region_dir);
            if region_filter.is_some_and(|f| f != region) {
                continue;
            }
            all_events.extend(read_event_files(&region_dir, &region)?);
        }

        if region_filter.map_or(true, |f| f == CUSTOM_REGION) {
            all_events.extend(read_event_files(&self.custom_dir(), CUSTOM_REGION)?);
        }

        Ok(all_events)
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else; empty labels become `custom`.
pub fn safe_label(label: &str) -> String {
    let label = label.trim();
    let label = if label.is_empty() { CUSTOM_REGION } else { label };
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn read_event_files(dir: &Path, region: &str) -> Result<Vec<PerformanceEvent>> {
    let mut events = Vec::new();
    for path in sorted_entries(dir)? {
        let name = file_name(&path);
        if name == SOURCES_INDEX_FILE || !name.ends_with(".json") {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(crate::error::ScraperError::from)
            .and_then(|c| Ok(serde_json::from_str::<Vec<PerformanceEvent>>(&c)?));
        match parsed {
            Ok(mut file_events) => {
                debug!(file = %path.display(), count = file_events.len(), "loaded events");
                for event in &mut file_events {
                    if event.region.is_empty() {
                        event.region = region.to_string();
                    }
                }
                events.extend(file_events);
            }
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable events file"),
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(id: &str, region: &str) -> PerformanceEvent {
        let mut ev = PerformanceEvent::new(id.into(), format!("Title {}", id), vec![], String::new());
        ev.region = region.into();
        ev
    }

    #[test]
    fn test_venue_file_layout_and_round_trip() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();

        let path = store
            .write_venue_events("socal", "laopera", date, &[event("a", "")])
            .unwrap();

        assert!(path.ends_with("data/raw/regional/socal/laopera_20250309.json"));
        let loaded = store.load_events(None).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].region, "socal");
    }

    #[test]
    fn test_region_filter_and_custom_events() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        store.write_venue_events("socal", "a", date, &[event("1", "socal")]).unwrap();
        store.write_venue_events("norcal", "b", date, &[event("2", "norcal")]).unwrap();
        let at = date.and_hms_opt(12, 30, 5).unwrap();
        let custom = store.write_custom_events("My Label!", at, &[event("3", "")]).unwrap();
        store
            .append_source(CustomSource {
                url: "https://x.example".into(),
                label: "My Label!".into(),
                scraped_at: "2025-01-01T12:30:05Z".into(),
                event_count: 1,
            })
            .unwrap();

        assert!(custom.ends_with("data/raw/custom/My_Label__20250101_123005.json"));
        assert_eq!(store.load_events(None).unwrap().len(), 3);

        let socal = store.load_events(Some("socal")).unwrap();
        assert_eq!(socal.len(), 1);
        assert_eq!(socal[0].event_id, "1");

        let adhoc = store.load_events(Some("custom")).unwrap();
        assert_eq!(adhoc.len(), 1);
        assert_eq!(adhoc[0].region, "custom");
    }

    #[test]
    fn test_sources_index_appends() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());
        assert!(store.load_sources().unwrap().is_empty());

        for n in 0..3 {
            store
                .append_source(CustomSource {
                    url: format!("https://site{}.example", n),
                    label: String::new(),
                    scraped_at: "2025-01-01T00:00:00Z".into(),
                    event_count: n,
                })
                .unwrap();
        }

        let sources = store.load_sources().unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[2].event_count, 2);
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());
        let region_dir = store.regional_dir("atl");
        fs::create_dir_all(&region_dir).unwrap();
        fs::write(region_dir.join("broken.json"), "{not json").unwrap();
        fs::write(region_dir.join("notes.txt"), "ignore me").unwrap();

        assert!(store.load_events(None).unwrap().is_empty());
    }

    #[test]
    fn test_safe_label() {
        assert_eq!(safe_label(""), "custom");
        assert_eq!(safe_label("sf-opera_2025"), "sf-opera_2025");
        assert_eq!(safe_label("a/b c"), "a_b_c");
    }
}

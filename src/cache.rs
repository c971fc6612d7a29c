use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Rendered-page cache keyed by the SHA-256 of the request URL.
///
/// Entries are plain files whose mtime is their creation time. An entry is
/// fresh while its age is within the TTL; nothing else ever evicts it, so the
/// directory grows without bound.
#[derive(Debug, Clone)]
pub struct HtmlCache {
    base_dir: PathBuf,
    ttl: Duration,
}

impl HtmlCache {
    pub fn new(base_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            base_dir: base_dir.into(),
            ttl,
        }
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hex = hex::encode(hasher.finalize());
        self.base_dir.join(format!("{}.html", hex))
    }

    /// Stored bytes for `url`, or `None` when absent, unreadable or stale.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let path = self.path_for(url);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        // A clock that went backwards yields an Err here; treat it as age zero.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            debug!(url, age_secs = age.as_secs(), "cache entry stale");
            return None;
        }

        fs::read(&path).ok()
    }

    pub fn put(&self, url: &str, content: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        fs::write(self.path_for(url), content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_put_then_get_is_byte_exact() {
        let dir = tempdir().unwrap();
        let cache = HtmlCache::new(dir.path(), Duration::from_secs(3600));
        let body = "<html>caf\u{e9} \u{1f3ad}</html>\r\n\0tail".as_bytes();

        cache.put("https://opera.example/calendar", body).unwrap();
        assert_eq!(cache.get("https://opera.example/calendar").unwrap(), body);
    }

    #[test]
    fn test_missing_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = HtmlCache::new(dir.path(), Duration::from_secs(3600));
        assert!(cache.get("https://opera.example/nothing").is_none());
    }

    #[test]
    fn test_entry_older_than_ttl_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = HtmlCache::new(dir.path(), Duration::from_secs(3600));
        let url = "https://opera.example/season";
        cache.put(url, b"old page").unwrap();

        let two_hours_ago = SystemTime::now() - Duration::from_secs(7200);
        File::options()
            .write(true)
            .open(cache.path_for(url))
            .unwrap()
            .set_modified(two_hours_ago)
            .unwrap();

        assert!(cache.get(url).is_none());
    }

    #[test]
    fn test_put_overwrites_previous_entry() {
        let dir = tempdir().unwrap();
        let cache = HtmlCache::new(dir.path().join("nested"), Duration::from_secs(60));
        cache.put("u", b"first").unwrap();
        cache.put("u", b"second").unwrap();
        assert_eq!(cache.get("u").unwrap(), b"second");
    }

    #[test]
    fn test_key_is_stable_sha256_of_url() {
        let cache = HtmlCache::new("/tmp/cache", Duration::from_secs(60));
        let path = cache.path_for("https://example.com");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "100680ad546ce6a577f42f52df33b4cfdca756859e664b8d7de329b150d09ce9.html"
        );
    }
}

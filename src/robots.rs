//! robots.txt policy parsing and the per-host guard used before every fetch.

use crate::constants::{MAX_CRAWL_DELAY_SECS, ROBOTS_FETCH_TIMEOUT_SECS};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// One `Allow`/`Disallow` line, compiled for matching.
#[derive(Debug, Clone)]
struct PathRule {
    allow: bool,
    specificity: usize,
    matcher: Regex,
}

impl PathRule {
    fn new(pattern: &str, allow: bool) -> Option<Self> {
        let (body, anchored) = match pattern.strip_suffix('$') {
            Some(body) => (body, true),
            None => (pattern, false),
        };
        let mut expr = String::from("^");
        expr.push_str(&regex::escape(body).replace(r"\*", ".*"));
        if anchored {
            expr.push('$');
        }
        let matcher = Regex::new(&expr).ok()?;
        Some(Self {
            allow,
            specificity: pattern.len(),
            matcher,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct AgentGroup {
    /// Lowercased user-agent tokens sharing this group
    agents: Vec<String>,
    rules: Vec<PathRule>,
    crawl_delay: Option<f64>,
}

impl AgentGroup {
    fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<&PathRule> = None;
        for rule in self.rules.iter().filter(|r| r.matcher.is_match(path)) {
            best = match best {
                None => Some(rule),
                Some(current) if rule.specificity > current.specificity => Some(rule),
                Some(current) if rule.specificity == current.specificity && rule.allow => {
                    Some(rule)
                }
                keep => keep,
            };
        }
        best.map_or(true, |rule| rule.allow)
    }
}

/// Parsed robots.txt for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<AgentGroup>,
}

impl RobotsPolicy {
    /// A policy that permits every path for every agent.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Self {
        let mut policy = Self::default();
        let mut current = AgentGroup::default();
        let mut in_rules = false;

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if in_rules {
                        policy.groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(rule) = PathRule::new(value, directive == "allow") {
                        current.rules.push(rule);
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    current.crawl_delay = value.parse::<f64>().ok();
                }
                _ => {}
            }
        }

        if !current.agents.is_empty() {
            policy.groups.push(current);
        }
        policy
    }

    /// Most specific group whose token appears in the user agent, else `*`.
    fn group_for(&self, user_agent: &str) -> Option<&AgentGroup> {
        let ua = user_agent.to_lowercase();
        let mut best: Option<(&AgentGroup, usize)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                if agent == "*" || agent.is_empty() || !ua.contains(agent.as_str()) {
                    continue;
                }
                if best.map_or(true, |(_, len)| agent.len() > len) {
                    best = Some((group, agent.len()));
                }
            }
        }
        best.map(|(group, _)| group).or_else(|| {
            self.groups
                .iter()
                .find(|g| g.agents.iter().any(|a| a == "*"))
        })
    }

    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        self.group_for(user_agent)
            .map_or(true, |group| group.is_allowed(path))
    }

    /// Crawl-delay of the agent's group, capped at `MAX_CRAWL_DELAY_SECS`.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let secs = self.group_for(user_agent)?.crawl_delay?;
        if !secs.is_finite() {
            return None;
        }
        Duration::try_from_secs_f64(secs.min(MAX_CRAWL_DELAY_SECS as f64)).ok()
    }
}

/// Lazily fetches and caches robots.txt per scheme+host for the process lifetime.
pub struct RobotsGuard {
    enabled: bool,
    client: reqwest::Client,
    policies: Mutex<HashMap<String, Arc<RobotsPolicy>>>,
}

impl RobotsGuard {
    pub fn new(enabled: bool) -> Self {
        Self::with_timeout(enabled, Duration::from_secs(ROBOTS_FETCH_TIMEOUT_SECS))
    }

    pub fn with_timeout(enabled: bool, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            enabled,
            client,
            policies: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, host: &str) -> Option<Arc<RobotsPolicy>> {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    fn store(&self, host: String, policy: RobotsPolicy) -> Arc<RobotsPolicy> {
        let policy = Arc::new(policy);
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host, policy.clone());
        policy
    }

    /// Whether `user_agent` may fetch `target_url`.
    ///
    /// Fails open when robots.txt cannot be fetched (and retries on the next
    /// call), fails closed on a URL that cannot be parsed.
    pub async fn is_allowed(&self, user_agent: &str, target_url: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let url = match Url::parse(target_url) {
            Ok(url) if url.host_str().is_some() => url,
            Ok(_) => {
                warn!(url = target_url, "URL has no host; refusing");
                return false;
            }
            Err(e) => {
                warn!(url = target_url, error = %e, "Error parsing URL; refusing");
                return false;
            }
        };

        let host = url.origin().ascii_serialization();
        let policy = match self.cached(&host) {
            Some(policy) => policy,
            None => match self.fetch(&host).await {
                Some(policy) => self.store(host, policy),
                None => return true,
            },
        };

        policy.is_allowed(user_agent, url.path())
    }

    /// Crawl-delay from the already-fetched policy for `target_url`'s origin.
    pub fn crawl_delay(&self, user_agent: &str, target_url: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let url = Url::parse(target_url).ok()?;
        self.cached(&url.origin().ascii_serialization())?
            .crawl_delay(user_agent)
    }

    /// `None` means the fetch failed and nothing should be cached.
    async fn fetch(&self, host: &str) -> Option<RobotsPolicy> {
        let robots_url = format!("{}/robots.txt", host);
        info!("Fetching robots.txt from {}", robots_url);

        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Error fetching robots.txt: {}. Assuming allowed.", e);
                return None;
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            info!("robots.txt not found (HTTP {}). Assuming allowed.", status);
            return Some(RobotsPolicy::allow_all());
        }

        match response.text().await {
            Ok(body) => {
                debug!(host, bytes = body.len(), "parsed robots.txt");
                Some(RobotsPolicy::parse(&body))
            }
            Err(e) => {
                warn!("Error reading robots.txt: {}. Assuming allowed.", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const UA: &str = "ViolettaOperaGraph/1.0 (research project)";

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /public/
Crawl-delay: 2

Sitemap: https://example.com/sitemap.xml
        "#;

        let robots = RobotsPolicy::parse(content);

        assert!(robots.is_allowed("TestBot", "/public/page"));
        assert!(!robots.is_allowed("TestBot", "/private/page"));
        assert!(!robots.is_allowed("TestBot", "/admin/"));
        assert!(robots.is_allowed("TestBot", "/other/page"));
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_specific_user_agent_wins_over_wildcard() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: violettaoperagraph
Disallow:
        "#;

        let robots = RobotsPolicy::parse(content);

        assert!(!robots.is_allowed("BadBot", "/calendar"));
        assert!(robots.is_allowed(UA, "/calendar"));
    }

    #[test]
    fn test_longest_match_and_allow_tie_break() {
        let content = r#"
User-agent: *
Disallow: /season/
Allow: /season/calendar
Disallow: /tickets
Allow: /tickets
        "#;

        let robots = RobotsPolicy::parse(content);

        assert!(!robots.is_allowed(UA, "/season/archive"));
        assert!(robots.is_allowed(UA, "/season/calendar/2025"));
        assert!(robots.is_allowed(UA, "/tickets"));
    }

    #[test]
    fn test_wildcards_and_end_anchor() {
        let content = "User-agent: *\nDisallow: /*.pdf$\nDisallow: /search*q=\n";
        let robots = RobotsPolicy::parse(content);

        assert!(!robots.is_allowed(UA, "/programs/traviata.pdf"));
        assert!(robots.is_allowed(UA, "/programs/traviata.pdf.html"));
        assert!(!robots.is_allowed(UA, "/search/results?q=carmen"));
    }

    #[test]
    fn test_grouped_agents_share_rules() {
        let content = "User-agent: a-bot\nUser-agent: b-bot\nDisallow: /x\n\nUser-agent: *\nAllow: /\n";
        let robots = RobotsPolicy::parse(content);

        assert!(!robots.is_allowed("a-bot/2.0", "/x"));
        assert!(!robots.is_allowed("b-bot", "/x/y"));
        assert!(robots.is_allowed("c-bot", "/x"));
    }

    #[test]
    fn test_empty_policy_allows_everything() {
        let robots = RobotsPolicy::parse("");
        assert!(robots.is_allowed("AnyBot", "/any/path"));
        assert!(robots.crawl_delay("AnyBot").is_none());
    }

    #[test]
    fn test_crawl_delay_is_capped_and_bad_values_ignored() {
        let robots = RobotsPolicy::parse("User-agent: *\nCrawl-delay: 1e300\n");
        assert_eq!(
            robots.crawl_delay("AnyBot"),
            Some(Duration::from_secs(MAX_CRAWL_DELAY_SECS))
        );

        let robots = RobotsPolicy::parse("User-agent: *\nCrawl-delay: -4\n");
        assert!(robots.crawl_delay("AnyBot").is_none());

        let robots = RobotsPolicy::parse("User-agent: *\nCrawl-delay: 0.5\n");
        assert_eq!(robots.crawl_delay("AnyBot"), Some(Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn test_disabled_guard_always_allows() {
        let guard = RobotsGuard::new(false);
        assert!(guard.is_allowed(UA, "not a url").await);
    }

    #[tokio::test]
    async fn test_malformed_url_is_refused() {
        let guard = RobotsGuard::new(true);
        assert!(!guard.is_allowed(UA, "not a url").await);
        assert!(!guard.is_allowed(UA, "http://").await);
        assert!(!guard.is_allowed(UA, "mailto:box@example.com").await);
    }

    #[tokio::test]
    async fn test_policy_fetched_once_and_evaluated() {
        let server = MockServer::start_async().await;
        let robots = server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(200).body("User-agent: *\nDisallow: /private\n");
            })
            .await;

        let guard = RobotsGuard::new(true);
        assert!(guard.is_allowed(UA, &server.url("/calendar")).await);
        assert!(!guard.is_allowed(UA, &server.url("/private/page")).await);
        assert!(guard.is_allowed(UA, &server.url("/season")).await);

        robots.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_guard_reports_cached_crawl_delay() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(200).body("User-agent: *\nCrawl-delay: 3\n");
            })
            .await;

        let guard = RobotsGuard::new(true);
        assert!(guard.crawl_delay(UA, &server.url("/calendar")).is_none());
        assert!(guard.is_allowed(UA, &server.url("/calendar")).await);
        assert_eq!(
            guard.crawl_delay(UA, &server.url("/season")),
            Some(Duration::from_secs(3))
        );

        let disabled = RobotsGuard::new(false);
        assert!(disabled.crawl_delay(UA, &server.url("/calendar")).is_none());
    }

    #[tokio::test]
    async fn test_non_200_caches_allow_all() {
        let server = MockServer::start_async().await;
        let robots = server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(404);
            })
            .await;

        let guard = RobotsGuard::new(true);
        assert!(guard.is_allowed(UA, &server.url("/anything")).await);
        assert!(guard.is_allowed(UA, &server.url("/else")).await);

        robots.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_timeout_fails_open_without_caching() {
        let server = MockServer::start_async().await;
        let robots = server
            .mock_async(|when, then| {
                when.method(GET).path("/robots.txt");
                then.status(200)
                    .body("User-agent: *\nDisallow: /\n")
                    .delay(Duration::from_millis(500));
            })
            .await;

        let guard = RobotsGuard::with_timeout(true, Duration::from_millis(50));
        assert!(guard.is_allowed(UA, &server.url("/calendar")).await);
        assert!(guard.is_allowed(UA, &server.url("/calendar")).await);

        robots.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_open() {
        let guard = RobotsGuard::with_timeout(true, Duration::from_millis(500));
        assert!(guard.is_allowed(UA, "http://127.0.0.1:1/calendar").await);
    }
}

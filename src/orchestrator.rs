use crate::app::ports::Renderer;
use crate::cache::HtmlCache;
use crate::config::{Config, RegionConfig, VenueConfig};
use crate::constants::CUSTOM_REGION;
use crate::error::{Result, ScraperError};
use crate::parser::{fuzzy_match_title, parse_generic_events, ParserRegistry};
use crate::rate_limiter::DomainLimiter;
use crate::robots::RobotsGuard;
use crate::storage::EventStore;
use crate::types::{scraped_at_now, CustomSource, PerformanceEvent};
use chrono::Local;
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// What happened to one venue during a run.
#[derive(Debug, Clone, Serialize)]
pub struct VenueOutcome {
    pub region: String,
    pub venue_code: String,
    pub events: usize,
    pub strategy: Option<String>,
    pub cache_hit: bool,
    pub output_file: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub venues: Vec<VenueOutcome>,
}

impl RunSummary {
    pub fn total_events(&self) -> usize {
        self.venues.iter().map(|v| v.events).sum()
    }

    pub fn failed(&self) -> usize {
        self.venues.iter().filter(|v| v.error.is_some()).count()
    }

    pub fn outcome(&self, venue_code: &str) -> Option<&VenueOutcome> {
        self.venues.iter().find(|v| v.venue_code == venue_code)
    }
}

/// Events extracted from one venue page, before persistence.
#[derive(Debug, Clone)]
pub struct VenueScrape {
    pub events: Vec<PerformanceEvent>,
    pub strategy: String,
    pub cache_hit: bool,
}

/// Result of an ad-hoc URL scrape.
#[derive(Debug, Clone, Serialize)]
pub struct AdhocScrape {
    pub events: Vec<PerformanceEvent>,
    pub strategy: String,
    pub count: usize,
    pub saved_to: PathBuf,
}

struct FetchedPage {
    html: String,
    cache_hit: bool,
}

#[derive(Default)]
struct PageBudget {
    total: u32,
    per_domain: HashMap<String, u32>,
}

/// Drives venues through pacing, robots, cache, rendering, extraction and persistence.
pub struct ScrapeOrchestrator {
    config: Config,
    limiter: Arc<DomainLimiter>,
    robots: Arc<RobotsGuard>,
    cache: HtmlCache,
    renderer: Arc<dyn Renderer>,
    parsers: ParserRegistry,
    store: EventStore,
    known_titles: Vec<String>,
    budget: Mutex<PageBudget>,
}

impl ScrapeOrchestrator {
    /// Orchestrator with its own limiter and robots guard built from `config`.
    pub fn new(config: Config, data_dir: impl AsRef<Path>, renderer: Arc<dyn Renderer>) -> Self {
        let limiter = Arc::new(DomainLimiter::from_config(&config));
        let robots = Arc::new(RobotsGuard::new(config.scraping.robots_respect));
        Self::with_shared(config, data_dir, renderer, limiter, robots)
    }

    /// Orchestrator reusing long-lived limiter and robots state, so strikes and
    /// robots policies outlive a single run.
    pub fn with_shared(
        config: Config,
        data_dir: impl AsRef<Path>,
        renderer: Arc<dyn Renderer>,
        limiter: Arc<DomainLimiter>,
        robots: Arc<RobotsGuard>,
    ) -> Self {
        let data_dir = data_dir.as_ref();
        let cache = HtmlCache::new(data_dir.join("data").join("cache").join("html"), config.cache_ttl());
        Self {
            config,
            limiter,
            robots,
            cache,
            renderer,
            parsers: ParserRegistry::new(),
            store: EventStore::new(data_dir),
            known_titles: Vec::new(),
            budget: Mutex::new(PageBudget::default()),
        }
    }

    pub fn with_known_titles(mut self, titles: Vec<String>) -> Self {
        self.known_titles = titles;
        self
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn limiter(&self) -> &DomainLimiter {
        &self.limiter
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Scrape every configured region (or just `region_filter`), one venue at a time.
    pub async fn run(&self, region_filter: Option<&str>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if !self.config.regional_venues.enabled {
            info!("Regional venue scraping is disabled in config");
            return Ok(summary);
        }
        if self.config.scraping.robots_respect {
            info!("robots.txt respect: ENABLED");
        } else {
            warn!("robots.txt respect is DISABLED");
        }

        *self.budget.lock().unwrap_or_else(PoisonError::into_inner) = PageBudget::default();
        counter!("violetta_scrape_runs_total").increment(1);
        let run_started = Instant::now();

        for region in &self.config.regional_venues.regions {
            if region_filter.is_some_and(|code| code != region.code) {
                continue;
            }
            info!("Scraping region: {} ({})", region.name, region.code);

            for venue in &region.venues {
                let outcome = self.run_venue(region, venue).await;
                summary.venues.push(outcome);
            }
        }

        histogram!("violetta_scrape_run_duration_seconds").record(run_started.elapsed().as_secs_f64());
        info!(
            venues = summary.venues.len(),
            events = summary.total_events(),
            failed = summary.failed(),
            "Scrape run finished"
        );
        Ok(summary)
    }

    async fn run_venue(&self, region: &RegionConfig, venue: &VenueConfig) -> VenueOutcome {
        let started = Instant::now();
        let mut outcome = VenueOutcome {
            region: region.code.clone(),
            venue_code: venue.code.clone(),
            events: 0,
            strategy: None,
            cache_hit: false,
            output_file: None,
            error: None,
        };

        let result = match self.scrape_venue(&region.code, venue).await {
            Ok(scrape) => self.persist_venue(&region.code, venue, scrape, &mut outcome),
            Err(e) => Err(e),
        };

        let status = match &result {
            Ok(()) => "ok",
            Err(e) => {
                error!("[{}] Error: {}", venue.code, e);
                outcome.error = Some(e.to_string());
                "error"
            }
        };
        counter!("violetta_venue_scrapes_total", "venue" => venue.code.clone(), "status" => status)
            .increment(1);
        histogram!("violetta_venue_scrape_duration_seconds", "venue" => venue.code.clone())
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    fn persist_venue(
        &self,
        region_code: &str,
        venue: &VenueConfig,
        scrape: VenueScrape,
        outcome: &mut VenueOutcome,
    ) -> Result<()> {
        outcome.events = scrape.events.len();
        outcome.strategy = Some(scrape.strategy);
        outcome.cache_hit = scrape.cache_hit;

        if scrape.events.is_empty() {
            info!("[{}] No events found", venue.code);
            return Ok(());
        }

        let run_date = Local::now().date_naive();
        let path = self
            .store
            .write_venue_events(region_code, &venue.code, run_date, &scrape.events)?;
        info!("[{}] Saved {} events to {}", venue.code, scrape.events.len(), path.display());
        outcome.output_file = Some(path);
        Ok(())
    }

    /// Fetch and extract one venue's events without persisting them.
    ///
    /// Render failures add a strike against the venue's domain.
    #[instrument(skip(self, venue), fields(venue = %venue.code))]
    pub async fn scrape_venue(&self, region_code: &str, venue: &VenueConfig) -> Result<VenueScrape> {
        let target_url = venue.target_url().ok_or_else(|| {
            ScraperError::Config(format!("venue '{}' has no calendar or official URL", venue.code))
        })?;
        let domain = domain_key(target_url, &venue.code);

        let page = match self.fetch_page(&domain, target_url).await {
            Ok(page) => page,
            Err(e) => {
                if e.is_strike_worthy() {
                    self.limiter.strike(&domain).await;
                    counter!("violetta_domain_strikes_total", "domain" => domain.clone()).increment(1);
                }
                return Err(e);
            }
        };

        let extraction = self.parsers.extract(&venue.code, &page.html, target_url)?;
        let mut events = extraction.events;
        for event in &mut events {
            fill_venue_fields(event, region_code, venue);
            self.canonicalize_title(event);
        }

        debug!(strategy = %extraction.strategy, count = events.len(), "extracted events");
        counter!("violetta_events_extracted_total", "venue" => venue.code.clone())
            .increment(events.len() as u64);

        Ok(VenueScrape {
            events,
            strategy: extraction.strategy,
            cache_hit: page.cache_hit,
        })
    }

    /// Scrape an arbitrary page with the generic extractor and record it under `custom/`.
    #[instrument(skip(self))]
    pub async fn scrape_url(&self, url: &str, label: &str) -> Result<AdhocScrape> {
        let url = normalize_url(url)?;
        let domain = domain_key(&url, CUSTOM_REGION);

        let page = match self.fetch_page(&domain, &url).await {
            Ok(page) => page,
            Err(e) => {
                if e.is_strike_worthy() {
                    self.limiter.strike(&domain).await;
                }
                return Err(e);
            }
        };

        let extraction = parse_generic_events(&page.html, &url);
        let mut events = extraction.events;
        for event in &mut events {
            self.canonicalize_title(event);
        }

        let saved_to = self
            .store
            .write_custom_events(label, Local::now().naive_local(), &events)?;
        self.store.append_source(CustomSource {
            url: url.clone(),
            label: label.to_string(),
            scraped_at: scraped_at_now(),
            event_count: events.len(),
        })?;
        info!(
            "[scrape-url] {} events from {} via {}, saved to {}",
            events.len(),
            url,
            extraction.strategy,
            saved_to.display()
        );

        Ok(AdhocScrape {
            count: events.len(),
            events,
            strategy: extraction.strategy,
            saved_to,
        })
    }

    /// Limiter, robots, then cache or renderer. A robots Crawl-delay paces later fetches.
    async fn fetch_page(&self, domain: &str, url: &str) -> Result<FetchedPage> {
        self.limiter.wait(domain).await?;

        let user_agent = &self.config.scraping.user_agent;
        if !self.robots.is_allowed(user_agent, url).await {
            return Err(ScraperError::RobotsDisallowed {
                url: url.to_string(),
            });
        }
        if let Some(delay) = self.robots.crawl_delay(user_agent, url) {
            self.limiter.set_crawl_delay(domain, delay).await;
        }

        if let Some(bytes) = self.cache.get(url) {
            debug!("cache hit for {}", url);
            counter!("violetta_cache_hits_total").increment(1);
            let html = String::from_utf8(bytes)
                .map_err(|e| ScraperError::Parse(format!("cached page for {} is not UTF-8: {}", url, e)))?;
            return Ok(FetchedPage {
                html,
                cache_hit: true,
            });
        }

        self.reserve_page(domain)?;
        let render_started = Instant::now();
        let html = self
            .renderer
            .render(url, user_agent)
            .await
            .map_err(|message| ScraperError::Render {
                url: url.to_string(),
                message,
            })?;
        histogram!("violetta_render_duration_seconds").record(render_started.elapsed().as_secs_f64());

        if let Err(e) = self.cache.put(url, html.as_bytes()) {
            warn!("failed to cache {}: {}", url, e);
        }

        Ok(FetchedPage {
            html,
            cache_hit: false,
        })
    }

    /// Count a renderer fetch against the run's page caps.
    fn reserve_page(&self, domain: &str) -> Result<()> {
        let caps = &self.config.scraping.hard_caps;
        let mut budget = self.budget.lock().unwrap_or_else(PoisonError::into_inner);

        if caps.max_total_pages_per_run > 0 && budget.total >= caps.max_total_pages_per_run {
            return Err(ScraperError::PageCapReached {
                scope: "run".to_string(),
                limit: caps.max_total_pages_per_run,
            });
        }
        let domain_pages = budget.per_domain.get(domain).copied().unwrap_or(0);
        if caps.max_pages_per_domain_per_run > 0 && domain_pages >= caps.max_pages_per_domain_per_run {
            return Err(ScraperError::PageCapReached {
                scope: domain.to_string(),
                limit: caps.max_pages_per_domain_per_run,
            });
        }

        budget.total += 1;
        budget.per_domain.insert(domain.to_string(), domain_pages + 1);
        Ok(())
    }

    fn canonicalize_title(&self, event: &mut PerformanceEvent) {
        if self.known_titles.is_empty() {
            return;
        }
        let matched = fuzzy_match_title(&event.title, &self.known_titles);
        if matched.is_match() && matched.title != event.title {
            debug!(from = %event.title, to = %matched.title, score = matched.score, "canonicalized title");
            event.title = matched.title;
        }
    }
}

/// Host of the URL, or `fallback` when it has none.
pub fn domain_key(url: &str, fallback: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| fallback.to_string())
}

/// Trim and default a bare host to `https://`.
pub fn normalize_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScraperError::InvalidInput("URL is required".to_string()));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(raw.to_string())
    } else {
        Ok(format!("https://{}", raw))
    }
}

fn fill_venue_fields(event: &mut PerformanceEvent, region_code: &str, venue: &VenueConfig) {
    event.region = region_code.to_string();
    if event.venue_code.is_empty() {
        event.venue_code = venue.code.clone();
    }
    if event.venue_name.is_empty() {
        event.venue_name = venue.name.clone();
    }
    if event.city.is_empty() {
        event.city = venue.city.clone();
    }
    if event.state.is_empty() {
        event.state = venue.state.clone();
    }
}

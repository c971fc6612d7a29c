use crate::error::{Result, ScraperError};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct DomainState {
    last_access: Option<Instant>,
    strike_count: u32,
    /// Lower bound on the gap between accesses, from robots.txt
    crawl_delay: Duration,
}

/// Per-domain pacing with a one-way circuit breaker.
///
/// Each domain gets its own async lock, so callers for the same domain queue
/// up behind each other while different domains proceed independently. A
/// domain whose strike count reaches `max_strikes` stays blocked for the life
/// of the limiter.
#[derive(Debug)]
pub struct DomainLimiter {
    domains: Mutex<HashMap<String, Arc<AsyncMutex<DomainState>>>>,
    min_delay: Duration,
    max_delay: Duration,
    max_strikes: u32,
}

impl DomainLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration, max_strikes: u32) -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            min_delay,
            max_delay: max_delay.max(min_delay),
            max_strikes,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.min_delay(),
            config.max_delay(),
            config.scraping.retry.strikes_per_domain_stop,
        )
    }

    fn slot(&self, domain: &str) -> Arc<AsyncMutex<DomainState>> {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        domains.entry(domain.to_string()).or_default().clone()
    }

    /// Existing slot only; reads never create state for unseen domains.
    fn existing(&self, domain: &str) -> Option<Arc<AsyncMutex<DomainState>>> {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .cloned()
    }

    fn jitter(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if max <= min {
            return self.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Block until the domain may be accessed again, or fail if it is blocked.
    pub async fn wait(&self, domain: &str) -> Result<()> {
        let slot = self.slot(domain);
        let mut state = slot.lock().await;

        if state.strike_count >= self.max_strikes {
            return Err(ScraperError::DomainBlocked {
                domain: domain.to_string(),
                strikes: state.strike_count,
            });
        }

        if let Some(last) = state.last_access {
            let gap = self.jitter().max(state.crawl_delay);
            let elapsed = last.elapsed();
            if elapsed < gap {
                let pause = gap - elapsed;
                debug!(domain, pause_ms = pause.as_millis() as u64, "pacing domain");
                tokio::time::sleep(pause).await;
            }
        }

        state.last_access = Some(Instant::now());
        Ok(())
    }

    /// Record one failure against the domain.
    pub async fn strike(&self, domain: &str) {
        let slot = self.slot(domain);
        let mut state = slot.lock().await;
        state.strike_count += 1;
        warn!(domain, "Strike {}/{}", state.strike_count, self.max_strikes);
    }

    /// Raise the domain's minimum spacing to at least `delay`.
    pub async fn set_crawl_delay(&self, domain: &str, delay: Duration) {
        let slot = self.slot(domain);
        let mut state = slot.lock().await;
        if delay > state.crawl_delay {
            debug!(domain, delay_ms = delay.as_millis() as u64, "honoring crawl-delay");
            state.crawl_delay = delay;
        }
    }

    pub async fn strikes(&self, domain: &str) -> u32 {
        match self.existing(domain) {
            Some(slot) => slot.lock().await.strike_count,
            None => 0,
        }
    }

    #[cfg(test)]
    fn tracked_domains(&self) -> usize {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn is_blocked(&self, domain: &str) -> bool {
        self.strikes(domain).await >= self.max_strikes
    }
}

use crate::constants::DEFAULT_USER_AGENT;
use crate::error::{Result, ScraperError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub regional_venues: RegionalVenues,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub hard_caps: HardCaps,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    #[serde(default = "default_true")]
    pub robots_respect: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Page budgets for a single run; zero means unlimited
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardCaps {
    #[serde(default)]
    pub max_pages_per_domain_per_run: u32,
    #[serde(default)]
    pub max_total_pages_per_run: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub strikes_per_domain_stop: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_hours: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionalVenues {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub official_url: String,
    #[serde(default)]
    pub calendar_url: String,
    #[serde(default)]
    pub operabase_url: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
}

impl VenueConfig {
    /// Calendar page when configured, official site otherwise.
    pub fn target_url(&self) -> Option<&str> {
        [self.calendar_url.as_str(), self.official_url.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|u| !u.is_empty())
    }
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ScraperError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let nav = &self.scraping.navigation;
        if nav.max_delay_ms < nav.min_delay_ms {
            return Err(ScraperError::Config(format!(
                "navigation.max_delay_ms ({}) is below min_delay_ms ({})",
                nav.max_delay_ms, nav.min_delay_ms
            )));
        }
        for region in &self.regional_venues.regions {
            if region.code.trim().is_empty() {
                return Err(ScraperError::Config(format!(
                    "region '{}' has an empty code",
                    region.name
                )));
            }
            for venue in &region.venues {
                if venue.code.trim().is_empty() {
                    return Err(ScraperError::Config(format!(
                        "venue '{}' in region '{}' has an empty code",
                        venue.name, region.code
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.scraping.navigation.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.scraping.navigation.max_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.scraping.cache.ttl_hours.saturating_mul(3600))
    }

    pub fn region(&self, code: &str) -> Option<&RegionConfig> {
        self.regional_venues.regions.iter().find(|r| r.code == code)
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("domain {domain} has {strikes} strikes, skipping")]
    DomainBlocked { domain: String, strikes: u32 },

    #[error("robots.txt disallows {url}")]
    RobotsDisallowed { url: String },

    #[error("render failed for {url}: {message}")]
    Render { url: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("page cap reached for {scope}: {limit} pages")]
    PageCapReached { scope: String, limit: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ScraperError {
    /// Failures that count against the domain's strike budget.
    pub fn is_strike_worthy(&self) -> bool {
        matches!(self, ScraperError::Render { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;

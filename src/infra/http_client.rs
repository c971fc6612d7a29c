use crate::app::ports::Renderer;
use crate::constants::RENDER_TIMEOUT_SECS;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use std::time::Duration;

/// Plain-HTTP renderer: fetches the page without executing scripts.
///
/// Throttling responses (429/403/503) and any other non-success status are
/// reported as errors so the caller can strike the domain.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRenderer {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(RENDER_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str, user_agent: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| format!("fetching {}: {}", url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status.as_u16(), url));
        }
        resp.text().await.map_err(|e| e.to_string())
    }
}

use async_trait::async_trait;

/// Turns a URL into page HTML.
///
/// Implementations own their navigation timeout; errors are opaque strings.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, user_agent: &str) -> Result<String, String>;
}

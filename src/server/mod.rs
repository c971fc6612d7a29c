//! Admin HTTP surface: trigger runs, scrape ad-hoc URLs, read results and config.

pub mod state;

use crate::config::Config;
use crate::error::ScraperError;
use axum::{
    body::Bytes,
    extract::Query,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use state::{AppState, RunGuard, RunState, RunStatus, FALLBACK_REGION};

/// Plain-text error response with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn busy() -> Self {
        Self::new(StatusCode::CONFLICT, "Scraper already running")
    }

    fn renderer_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Renderer not available. Restart server to retry.",
        )
    }
}

impl From<ScraperError> for ApiError {
    fn from(err: ScraperError) -> Self {
        match err {
            ScraperError::InvalidInput(msg) => Self::bad_request(msg),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "violetta-scraper",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": state.run_state.status() }))
}

#[derive(Debug, Default, Deserialize)]
struct RegionQuery {
    region: Option<String>,
}

impl RegionQuery {
    fn region(&self) -> Option<&str> {
        self.region.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Start a background run; the response returns immediately.
async fn trigger_scrape(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<RegionQuery>,
) -> ApiResult<impl IntoResponse> {
    let renderer = state.renderer.clone().ok_or_else(ApiError::renderer_unavailable)?;
    let run = state.run_state.try_start().ok_or_else(ApiError::busy)?;

    let requested = query.region().map(str::to_string);
    let task_state = state.clone();
    tokio::spawn(async move {
        info!("Scrape triggered via API");
        let result = async {
            let orchestrator = task_state.orchestrator(renderer)?;
            let region = requested
                .or_else(|| task_state.load_config().ok()?.regional_venues.default_region)
                .unwrap_or_else(|| FALLBACK_REGION.to_string());
            orchestrator.run(Some(region.as_str())).await
        }
        .await;

        match result {
            Ok(summary) => {
                info!(events = summary.total_events(), "API-triggered scrape finished");
                run.finish(RunStatus::Idle);
            }
            Err(e) => {
                error!("Scrape failed: {}", e);
                run.finish(RunStatus::Error);
            }
        }
    });

    Ok(Json(serde_json::json!({ "message": "Scrape started" })))
}

#[derive(Debug, Deserialize)]
struct ScrapeUrlRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    label: String,
}

async fn scrape_url(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let renderer = state.renderer.clone().ok_or_else(ApiError::renderer_unavailable)?;
    let request: ScrapeUrlRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid JSON body"))?;
    if request.url.trim().is_empty() {
        return Err(ApiError::bad_request("URL is required"));
    }
    // Dropping the request future drops `run`, which resets the state.
    let run = state.run_state.try_start().ok_or_else(ApiError::busy)?;

    let result = match state.orchestrator(renderer) {
        Ok(orchestrator) => orchestrator.scrape_url(&request.url, &request.label).await,
        Err(e) => Err(e),
    };
    run.finish(RunStatus::Idle);

    match result {
        Ok(scrape) => Ok(Json(scrape)),
        Err(ScraperError::InvalidInput(msg)) => Err(ApiError::bad_request(msg)),
        Err(e) => {
            error!("[scrape-url] Error: {}", e);
            Err(ApiError::internal(format!("Scrape failed: {}", e)))
        }
    }
}

async fn list_events(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<RegionQuery>,
) -> ApiResult<impl IntoResponse> {
    let events = state.store.load_events(query.region())?;
    Ok(Json(events))
}

async fn list_sources(Extension(state): Extension<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let sources = state.store.load_sources()?;
    Ok(Json(sources))
}

async fn get_config(Extension(state): Extension<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let content = fs::read_to_string(&state.config_path)
        .map_err(|_| ApiError::internal("Failed to read config"))?;
    Ok(([(header::CONTENT_TYPE, "application/toml")], content))
}

/// Replace the config file after the new document parses and validates.
async fn put_config(
    Extension(state): Extension<Arc<AppState>>,
    body: String,
) -> ApiResult<impl IntoResponse> {
    Config::from_toml_str(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    fs::write(&state.config_path, &body)
        .map_err(|e| ApiError::internal(format!("Failed to write config: {}", e)))?;
    info!("Config replaced via API at {}", state.config_path.display());
    Ok(Json(serde_json::json!({ "message": "Config updated" })))
}

/// Create the admin router
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/scrape", post(trigger_scrape))
        .route("/api/scrape-url", post(scrape_url))
        .route("/api/events", get(list_events))
        .route("/api/sources", get(list_sources))
        .route("/api/config", get(get_config).post(put_config))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

pub async fn start_server(state: Arc<AppState>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting Violetta server on http://localhost:{}", port);
    info!("  API:    http://localhost:{}/api/", port);
    info!("  Health: http://localhost:{}/health", port);

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::Renderer;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
[scraping]
robots_respect = false

[scraping.navigation]
min_delay_ms = 0
max_delay_ms = 0

[scraping.retry]
strikes_per_domain_stop = 3

[scraping.cache]
ttl_hours = 1

[regional_venues]
enabled = true
default_region = "socal"

[[regional_venues.regions]]
name = "Southern California"
code = "socal"
"#;

    struct PageRenderer;

    #[async_trait]
    impl Renderer for PageRenderer {
        async fn render(&self, _url: &str, _user_agent: &str) -> std::result::Result<String, String> {
            Ok(r#"<html><head><script type="application/ld+json">
                {"@type":"Event","name":"Carmen","startDate":"2025-05-01"}
                </script></head></html>"#
                .to_string())
        }
    }

    struct SlowRenderer;

    #[async_trait]
    impl Renderer for SlowRenderer {
        async fn render(&self, _url: &str, _user_agent: &str) -> std::result::Result<String, String> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok("<html></html>".to_string())
        }
    }

    fn app_state(dir: &Path, renderer: Option<Arc<dyn Renderer>>) -> Arc<AppState> {
        let config_path = dir.join("config.toml");
        fs::write(&config_path, CONFIG).unwrap();
        let config = Config::from_toml_str(CONFIG).unwrap();
        Arc::new(AppState::new(&config, config_path, dir, renderer))
    }

    async fn send(state: Arc<AppState>, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = create_server(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), None);

        let (code, body) = send(state.clone(), "GET", "/health", "").await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("healthy"));

        let (code, body) = send(state, "GET", "/api/status", "").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, r#"{"status":"Idle"}"#);
    }

    #[tokio::test]
    async fn test_scrape_rejected_while_running() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), Some(Arc::new(PageRenderer)));
        let _running = state.run_state.try_start().unwrap();

        let (code, _) = send(state.clone(), "POST", "/api/scrape", "").await;
        assert_eq!(code, StatusCode::CONFLICT);

        let (code, _) = send(state, "POST", "/api/scrape-url", r#"{"url":"example.org"}"#).await;
        assert_eq!(code, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_abandoned_scrape_url_request_releases_run_state() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), Some(Arc::new(SlowRenderer)));

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            send(state.clone(), "POST", "/api/scrape-url", r#"{"url":"opera.example/slow"}"#),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(state.run_state.status(), RunStatus::Idle);

        let (code, _) = send(state, "POST", "/api/scrape", "").await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_scrape_url_without_renderer_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), None);

        let (code, _) = send(state, "POST", "/api/scrape-url", r#"{"url":"example.org"}"#).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_scrape_url_bad_input() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), Some(Arc::new(PageRenderer)));

        let (code, body) = send(state.clone(), "POST", "/api/scrape-url", "{not json").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid JSON body");

        let (code, body) = send(state.clone(), "POST", "/api/scrape-url", r#"{"label":"x"}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body, "URL is required");
        assert_eq!(state.run_state.status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_scrape_url_then_query_events_and_sources() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), Some(Arc::new(PageRenderer)));

        let (code, body) = send(
            state.clone(),
            "POST",
            "/api/scrape-url",
            r#"{"url":"opera.example/season","label":"test"}"#,
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        let result: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(result["strategy"], "json-ld");
        assert_eq!(result["count"], 1);
        assert_eq!(state.run_state.status(), RunStatus::Idle);

        let (_, body) = send(state.clone(), "GET", "/api/events?region=custom", "").await;
        let events: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(events[0]["opera_title"], "Carmen");
        assert_eq!(events[0]["region"], "custom");

        let (_, body) = send(state.clone(), "GET", "/api/events?region=socal", "").await;
        assert_eq!(body, "[]");

        let (_, body) = send(state, "GET", "/api/sources", "").await;
        let sources: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(sources[0]["url"], "https://opera.example/season");
        assert_eq!(sources[0]["label"], "test");
    }

    #[tokio::test]
    async fn test_config_read_and_replace() {
        let dir = TempDir::new().unwrap();
        let state = app_state(dir.path(), None);

        let (code, body) = send(state.clone(), "GET", "/api/config", "").await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("strikes_per_domain_stop = 3"));

        let (code, _) = send(state.clone(), "POST", "/api/config", "[scraping\nbroken").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(fs::read_to_string(&state.config_path).unwrap(), CONFIG);

        let updated = CONFIG.replace("strikes_per_domain_stop = 3", "strikes_per_domain_stop = 5");
        let (code, _) = send(state.clone(), "POST", "/api/config", &updated).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(state.load_config().unwrap().scraping.retry.strikes_per_domain_stop, 5);
    }
}

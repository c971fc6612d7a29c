use crate::app::ports::Renderer;
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::ScrapeOrchestrator;
use crate::rate_limiter::DomainLimiter;
use crate::robots::RobotsGuard;
use crate::storage::EventStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Region scraped by `POST /api/scrape` when neither the request nor the config names one
pub const FALLBACK_REGION: &str = "socal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Idle,
    Running,
    Error,
}

/// Scrape run state shared by the admin handlers. Only one run at a time.
#[derive(Debug, Clone)]
pub struct RunState {
    status: Arc<Mutex<RunStatus>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(RunStatus::Idle)),
        }
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `Running` unless a run is already in progress.
    ///
    /// The returned guard leaves `Running` when finished or dropped, so a
    /// cancelled request or panicking task cannot wedge the state.
    pub fn try_start(&self) -> Option<RunGuard> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == RunStatus::Running {
            return None;
        }
        *status = RunStatus::Running;
        Some(RunGuard {
            status: self.status.clone(),
            finished: false,
        })
    }
}

/// Held for the duration of a run.
///
/// Dropped without `finish`: `Error` while unwinding from a panic, `Idle` otherwise.
#[derive(Debug)]
pub struct RunGuard {
    status: Arc<Mutex<RunStatus>>,
    finished: bool,
}

impl RunGuard {
    pub fn finish(mut self, outcome: RunStatus) {
        self.set(outcome);
        self.finished = true;
    }

    fn set(&self, outcome: RunStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let outcome = if std::thread::panicking() {
            RunStatus::Error
        } else {
            RunStatus::Idle
        };
        self.set(outcome);
    }
}

/// Everything the admin handlers need. Limiter and robots state live as long
/// as the server so strikes carry over between triggered runs.
pub struct AppState {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub renderer: Option<Arc<dyn Renderer>>,
    pub limiter: Arc<DomainLimiter>,
    pub robots: Arc<RobotsGuard>,
    pub run_state: RunState,
    pub store: EventStore,
}

impl AppState {
    pub fn new(
        config: &Config,
        config_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        renderer: Option<Arc<dyn Renderer>>,
    ) -> Self {
        let data_dir = data_dir.into();
        Self {
            config_path: config_path.into(),
            store: EventStore::new(&data_dir),
            data_dir,
            renderer,
            limiter: Arc::new(DomainLimiter::from_config(config)),
            robots: Arc::new(RobotsGuard::new(config.scraping.robots_respect)),
            run_state: RunState::new(),
        }
    }

    /// Current config from disk, so edits made through `/api/config` apply to the next run.
    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path)
    }

    pub fn orchestrator(&self, renderer: Arc<dyn Renderer>) -> Result<ScrapeOrchestrator> {
        let config = self.load_config()?;
        Ok(ScrapeOrchestrator::with_shared(
            config,
            &self.data_dir,
            renderer,
            self.limiter.clone(),
            self.robots.clone(),
        ))
    }
}

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use violetta_scraper::app::ports::Renderer;
use violetta_scraper::config::Config;
use violetta_scraper::constants::{CONFIG_PATH_ENV, DATA_DIR_ENV, DEFAULT_CONFIG_PATH};
use violetta_scraper::infra::http_client::HttpRenderer;
use violetta_scraper::logging;
use violetta_scraper::orchestrator::{RunSummary, ScrapeOrchestrator};
use violetta_scraper::server::{self, AppState};

#[derive(Parser)]
#[command(name = "violetta_scraper")]
#[command(about = "Polite event scraper for opera venue websites")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Root directory for scraped data and the page cache
    #[arg(long, global = true, env = DATA_DIR_ENV, default_value = ".")]
    data_dir: PathBuf,

    /// Newline-separated list of canonical titles to snap scraped titles onto
    #[arg(long, global = true)]
    known_titles: Option<PathBuf>,

    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every configured venue, or one region
    Run {
        /// Region code to scrape (e.g. socal, norcal)
        #[arg(long)]
        region: Option<String>,
    },
    /// Scrape a single page with the generic extractor
    ScrapeUrl {
        url: String,
        /// Label used in the output file name
        #[arg(long, default_value = "")]
        label: String,
    },
    /// Serve the admin HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

fn load_known_titles(path: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading known titles from {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Scrape results:");
    for venue in &summary.venues {
        match &venue.error {
            Some(e) => println!("   ❌ {}/{}: {}", venue.region, venue.venue_code, e),
            None => println!(
                "   ✅ {}/{}: {} events via {}{}",
                venue.region,
                venue.venue_code,
                venue.events,
                venue.strategy.as_deref().unwrap_or("-"),
                if venue.cache_hit { " (cached)" } else { "" }
            ),
        }
    }
    println!(
        "   Total events: {} ({} venues failed)",
        summary.total_events(),
        summary.failed()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = Config::load(&cli.config)?;
    let known_titles = load_known_titles(cli.known_titles.as_deref())?;
    let renderer: Arc<dyn Renderer> = Arc::new(HttpRenderer::new());

    match cli.command {
        Commands::Run { region } => {
            let orchestrator = ScrapeOrchestrator::new(config, &cli.data_dir, renderer)
                .with_known_titles(known_titles);
            let summary = orchestrator.run(region.as_deref()).await?;
            print_summary(&summary);
            if summary.failed() > 0 {
                warn!("{} venues failed", summary.failed());
            }
        }
        Commands::ScrapeUrl { url, label } => {
            let orchestrator = ScrapeOrchestrator::new(config, &cli.data_dir, renderer)
                .with_known_titles(known_titles);
            match orchestrator.scrape_url(&url, &label).await {
                Ok(result) => {
                    println!(
                        "✅ {} events via {} saved to {}",
                        result.count,
                        result.strategy,
                        result.saved_to.display()
                    );
                }
                Err(e) => {
                    error!("Scrape failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Serve { port } => {
            let state = Arc::new(AppState::new(&config, &cli.config, &cli.data_dir, Some(renderer)));
            info!("Serving admin API for data dir {}", cli.data_dir.display());
            server::start_server(state, port)
                .await
                .map_err(|e| anyhow!("server failed: {}", e))?;
        }
    }

    Ok(())
}

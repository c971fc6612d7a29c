use std::fs;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "scraper.log";

/// Initializes console output plus a daily-rolling JSON log file under `logs/`.
///
/// `RUST_LOG` directives apply alongside `violetta_scraper=info`; `verbose`
/// raises the crate's level to debug.
pub fn init_logging(verbose: bool) {
    let _ = fs::create_dir_all(LOG_DIR);

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let directive = format!("violetta_scraper={}", level)
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // Keep the writer alive for the life of the process so buffered lines are flushed.
    std::mem::forget(guard);
}

pub mod browser;
pub mod config;
pub mod db;
pub mod fetch;
pub mod listing;
pub mod models;
pub mod scraping;
pub mod utils;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use scraping::{run_scrape, RunError, RunReport};

const DEFAULT_LOG_FILTER: &str = "event_scrape_lib=info,event_scrape=info";

/// Installs the global subscriber: human-readable lines on stderr plus a plain
/// copy appended to `log_file`. `RUST_LOG` overrides the default filter.
///
/// If the log file cannot be opened the stderr layer is still installed.
pub fn init_logging(log_file: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    utils::ensure_parent(log_file);
    let file = OpenOptions::new().create(true).append(true).open(log_file);
    let (file_layer, open_error) = match file {
        Ok(file) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        return;
    }
    if let Some(err) = open_error {
        tracing::warn!(path = %log_file.display(), error = %err, "log file unavailable, logging to stderr only");
    }
}

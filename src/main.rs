use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use event_scrape_lib::browser::ChromeLauncher;
use event_scrape_lib::config::ConfigStore;
use event_scrape_lib::db::Store;
use event_scrape_lib::listing::open_listing;
use event_scrape_lib::{init_logging, run_scrape, utils};

/// Scrapes a city's event listing into a local SQLite snapshot.
#[derive(Parser, Debug)]
#[command(name = "event-scrape")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, env = "EVENT_SCRAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, global = true, env = "EVENT_SCRAPE_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the listing and replace the stored events
    Scrape,
    /// Print the stored events as the front end sees them
    List,
    /// Show or edit the config file
    Config {
        /// Write the effective config back to disk, creating it if missing
        #[arg(long)]
        write_default: bool,
        /// Keyword an event must mention to be kept
        #[arg(long)]
        locale: Option<String>,
        /// Listing page to scrape
        #[arg(long)]
        listing_url: Option<String>,
        /// Download images locally instead of storing remote URLs
        #[arg(long)]
        download_images: Option<bool>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&utils::log_path());

    let config_store = match &cli.config {
        Some(path) => ConfigStore::load(path.clone()),
        None => ConfigStore::load_default(),
    }
    .context("failed to load config")?;
    let database = cli.database.clone().unwrap_or_else(utils::database_path);

    match cli.command {
        Command::Scrape => scrape(&config_store, &database),
        Command::List => list(&database),
        Command::Config {
            write_default,
            locale,
            listing_url,
            download_images,
        } => {
            let changed = write_default
                || locale.is_some()
                || listing_url.is_some()
                || download_images.is_some();
            let config = if changed {
                config_store
                    .update(|config| {
                        if let Some(locale) = locale {
                            config.locale_keyword = locale;
                        }
                        if let Some(url) = listing_url {
                            config.listing_url = url;
                        }
                        if let Some(download) = download_images {
                            config.images.download = download;
                        }
                    })
                    .context("failed to write config")?
            } else {
                config_store.read()
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn scrape(config_store: &ConfigStore, database: &Path) -> Result<()> {
    let config = config_store.read();
    info!(url = %config.listing_url, locale = %config.locale_keyword, "starting scrape");

    let mut store = Store::open(database)
        .with_context(|| format!("failed to open database {}", database.display()))?;
    let launcher = ChromeLauncher::from_config(&config.fetch);

    match run_scrape(&config, &launcher, &mut store) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "scrape failed, previous events kept");
            Err(err).context("scrape failed")
        }
    }
}

fn list(database: &Path) -> Result<()> {
    let listing = open_listing(database);
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

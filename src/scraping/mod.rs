pub mod assemble;
pub mod base;
pub mod download;
pub mod extract;
pub mod image;
pub mod pool;

use std::collections::BTreeMap;

use scraper::Html;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::browser::SessionLauncher;
use crate::config::{AppConfig, CompiledSelectors, ConfigError};
use crate::db::{Store, StoreError};
use crate::fetch::{Diagnostics, FetchError, FetchOrchestrator};
use crate::models::{CandidateEvent, NewEvent};
use assemble::ResultAssembler;
use download::{ImageDownloader, ImageError};
use image::ImageResolver;

/// Why one card or candidate left the pipeline. Never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    CardParse(String),
    OutsideLocale,
    Duplicate,
    NoImage,
    ImageDownload(String),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::CardParse(_) => "card_parse",
            SkipReason::OutsideLocale => "outside_locale",
            SkipReason::Duplicate => "duplicate",
            SkipReason::NoImage => "no_image",
            SkipReason::ImageDownload(_) => "image_download",
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("image downloader setup failed: {0}")]
    Downloader(#[from] ImageError),
    #[error("detail worker pool failed to start: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("storage swap failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub attempt: u32,
    pub scrolls: u32,
    pub cards: usize,
    pub persisted: usize,
    pub swapped: bool,
    pub skipped: BTreeMap<&'static str, usize>,
}

impl RunReport {
    fn record_skip(&mut self, reason: &SkipReason) {
        *self.skipped.entry(reason.label()).or_default() += 1;
    }
}

/// Extracts every card in `html` and runs the card-level image lookups on it.
pub fn collect_candidates(
    html: &str,
    listing_url: &str,
    selectors: &CompiledSelectors,
    cdn_marker: &str,
) -> Vec<Result<CandidateEvent, SkipReason>> {
    let document = Html::parse_document(html);
    let cards = extract::card_elements(&document, selectors);
    info!(count = cards.len(), "found event elements");

    cards
        .iter()
        .map(|card| {
            match extract::extract_card(card, listing_url, selectors) {
                Ok(mut candidate) => {
                    candidate.image_url =
                        image::from_markup(card, listing_url, &selectors.image, cdn_marker, true);
                    Ok(candidate)
                }
                Err(reason) => {
                    warn!(?reason, "error parsing event card");
                    Err(reason)
                }
            }
        })
        .collect()
}

/// Turns rendered listing HTML into the final batch.
///
/// Locale and duplicate checks run before image resolution so detail pages are
/// only fetched for candidates that can still make it into the batch.
pub fn build_batch<L: SessionLauncher>(
    html: &str,
    config: &AppConfig,
    selectors: &CompiledSelectors,
    launcher: &L,
    downloader: Option<&ImageDownloader>,
    report: &mut RunReport,
) -> Result<Vec<NewEvent>, RunError> {
    let outcomes = collect_candidates(
        html,
        &config.listing_url,
        selectors,
        &config.images.cdn_proxy_marker,
    );
    report.cards = outcomes.len();

    let mut assembler = ResultAssembler::new(config.locale_keyword.clone());
    let mut admitted = Vec::new();
    for outcome in outcomes {
        match outcome.and_then(|candidate| assembler.admit(candidate)) {
            Ok(candidate) => admitted.push(candidate),
            Err(reason) => report.record_skip(&reason),
        }
    }

    let resolver = ImageResolver::new(
        launcher,
        selectors,
        &config.selectors.detail_image,
        &config.fetch,
        &config.images.cdn_proxy_marker,
    )
    .with_downloader(downloader);
    let resolved = pool::run_bounded(admitted, config.fetch.worker_count(), |candidate| {
        resolver.resolve(candidate)
    })?;

    let mut batch = Vec::with_capacity(resolved.len());
    for outcome in resolved {
        match outcome.and_then(ResultAssembler::require_image) {
            Ok(event) => batch.push(event),
            Err(reason) => report.record_skip(&reason),
        }
    }
    Ok(batch)
}

/// One complete run: fetch, extract, resolve, assemble, swap.
///
/// A failed fetch or an empty batch leaves the stored snapshot as it was.
pub fn run_scrape<L: SessionLauncher>(
    config: &AppConfig,
    launcher: &L,
    store: &mut Store,
) -> Result<RunReport, RunError> {
    let selectors = config.selectors.compile()?;
    let downloader = if config.images.download {
        Some(ImageDownloader::new(&config.images)?)
    } else {
        None
    };

    let page = FetchOrchestrator::new(
        launcher,
        &config.fetch,
        &config.listing_url,
        &config.selectors.card,
        Diagnostics::new(config.diagnostics_dir()),
    )
    .save_page_source(config.save_page_source)
    .fetch()?;

    let mut report = RunReport {
        attempt: page.attempt,
        scrolls: page.scrolls,
        ..RunReport::default()
    };
    let batch = build_batch(
        &page.html,
        config,
        &selectors,
        launcher,
        downloader.as_ref(),
        &mut report,
    )?;

    if batch.is_empty() {
        warn!(cards = report.cards, "no events survived filtering, keeping previous snapshot");
        return Ok(report);
    }

    report.persisted = store.replace_all(&batch)?;
    report.swapped = true;
    info!(
        persisted = report.persisted,
        cards = report.cards,
        skipped = ?report.skipped,
        "successfully saved events to the database"
    );
    Ok(report)
}

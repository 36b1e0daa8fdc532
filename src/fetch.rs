//! Listing fetch: navigate, drain the infinite scroll, wait for cards, retry.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserError, PageSession, SessionGuard, SessionLauncher};
use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("browser session could not start: {0}")]
    SessionInit(#[source] BrowserError),
    #[error("listing fetch failed after {attempts} attempts: {last}")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        last: BrowserError,
    },
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub attempt: u32,
    pub scrolls: u32,
}

/// Writes post-mortem artifacts for failed attempts.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Best effort; a failed capture is logged and never replaces the attempt's own error.
    pub fn capture<S: PageSession + ?Sized>(&self, attempt: u32, session: &S) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "cannot create diagnostics dir");
            return;
        }

        let shot_path = self.dir.join(format!("error_screenshot_{attempt}.png"));
        match session.screenshot_png() {
            Ok(bytes) => self.write(&shot_path, &bytes),
            Err(err) => warn!(attempt, error = %err, "screenshot capture failed"),
        }

        let page_path = self.dir.join(format!("error_page_{attempt}.html"));
        match session.page_source() {
            Ok(html) => self.write(&page_path, html.as_bytes()),
            Err(err) => warn!(attempt, error = %err, "page source capture failed"),
        }
    }

    pub fn save_page(&self, html: &str) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "cannot create diagnostics dir");
            return;
        }
        self.write(&self.dir.join("page.html"), html.as_bytes());
    }

    fn write(&self, path: &Path, bytes: &[u8]) {
        match fs::write(path, bytes) {
            Ok(()) => info!(path = %path.display(), "wrote diagnostic artifact"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to write diagnostic artifact"),
        }
    }
}

pub struct FetchOrchestrator<'a, L: SessionLauncher> {
    launcher: &'a L,
    config: &'a FetchConfig,
    listing_url: &'a str,
    card_selectors: &'a [String],
    diagnostics: Diagnostics,
    save_page_source: bool,
}

impl<'a, L: SessionLauncher> FetchOrchestrator<'a, L> {
    pub fn new(
        launcher: &'a L,
        config: &'a FetchConfig,
        listing_url: &'a str,
        card_selectors: &'a [String],
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            launcher,
            config,
            listing_url,
            card_selectors,
            diagnostics,
            save_page_source: false,
        }
    }

    pub fn save_page_source(mut self, enabled: bool) -> Self {
        self.save_page_source = enabled;
        self
    }

    /// Runs attempts until one yields the rendered listing or the budget runs out.
    ///
    /// Every attempt gets a fresh session, released before the backoff sleep.
    pub fn fetch(&self) -> Result<FetchedPage, FetchError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(attempt, attempts, url = self.listing_url, "fetching listing");
            let session = SessionGuard::open(self.launcher).map_err(|err| {
                error!(error = %err, "failed to start browser");
                FetchError::SessionInit(err)
            })?;

            match self.run_attempt(&*session) {
                Ok((html, scrolls)) => {
                    info!(attempt, scrolls, bytes = html.len(), "listing rendered");
                    if self.save_page_source {
                        self.diagnostics.save_page(&html);
                    }
                    return Ok(FetchedPage {
                        html,
                        attempt,
                        scrolls,
                    });
                }
                Err(err) => {
                    error!(attempt, error = %err, "listing attempt failed");
                    self.diagnostics.capture(attempt, &*session);
                    drop(session);
                    if attempt >= attempts {
                        error!(attempts, "max retries reached, giving up");
                        return Err(FetchError::AttemptsExhausted { attempts, last: err });
                    }
                    thread::sleep(self.config.retry_backoff());
                    attempt += 1;
                }
            }
        }
    }

    fn run_attempt<S: PageSession + ?Sized>(
        &self,
        session: &S,
    ) -> Result<(String, u32), BrowserError> {
        session.navigate(self.listing_url, self.config.page_load_timeout())?;
        let scrolls = self.scroll_until_settled(session)?;
        session.wait_for_any(self.card_selectors, self.config.card_wait_timeout())?;
        let html = session.page_source()?;
        Ok((html, scrolls))
    }

    /// Scrolls until the page stops growing or the scroll cap is hit.
    fn scroll_until_settled<S: PageSession + ?Sized>(
        &self,
        session: &S,
    ) -> Result<u32, BrowserError> {
        let max_scrolls = self.config.max_scrolls;
        let mut last_height = session.scroll_height()?;
        let mut scrolls = 0;
        while scrolls < max_scrolls {
            session.scroll_to_bottom()?;
            thread::sleep(self.config.scroll_pause());
            let new_height = session.scroll_height()?;
            if new_height == last_height {
                info!(scrolls, "no more events to load");
                break;
            }
            last_height = new_height;
            scrolls += 1;
            debug!(scrolls, max_scrolls, height = new_height, "scrolled");
        }
        Ok(scrolls)
    }
}

//! Headless browser sessions.
//!
//! The pipeline only talks to [`PageSession`] and [`SessionLauncher`]; the Chrome
//! implementation lives behind them so fetch and fallback logic can run against
//! scripted sessions in tests.

use std::ffi::OsStr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FetchConfig;

const HIDE_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";
const ACCEPT_LANGUAGE: &str = "en-AU,en;q=0.9";
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("session already closed")]
    Closed,
}

/// Primitives the pipeline needs from one open browser page.
pub trait PageSession {
    fn navigate(&self, url: &str, deadline: Duration) -> Result<(), BrowserError>;
    fn scroll_height(&self) -> Result<u64, BrowserError>;
    fn scroll_to_bottom(&self) -> Result<(), BrowserError>;
    /// Blocks until at least one element matches any of `selectors`.
    fn wait_for_any(&self, selectors: &[String], deadline: Duration) -> Result<(), BrowserError>;
    fn page_source(&self) -> Result<String, BrowserError>;
    fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;
    /// Releases the browser process. Must be safe to call more than once.
    fn close(&mut self);
}

pub trait SessionLauncher: Sync {
    type Session: PageSession;

    fn open(&self) -> Result<Self::Session, BrowserError>;
}

/// Closes the wrapped session when dropped, on every exit path.
pub struct SessionGuard<S: PageSession> {
    session: S,
}

impl<S: PageSession> SessionGuard<S> {
    pub fn open<L>(launcher: &L) -> Result<Self, BrowserError>
    where
        L: SessionLauncher<Session = S>,
    {
        Ok(Self {
            session: launcher.open()?,
        })
    }
}

impl<S: PageSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: PageSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}

pub struct ChromeLauncher {
    user_agent: String,
    window_size: (u32, u32),
}

impl ChromeLauncher {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            window_size: config.window_size,
        }
    }
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    fn open(&self) -> Result<ChromeSession, BrowserError> {
        let ua_arg = format!("--user-agent={}", self.user_agent);
        let args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--blink-settings=imagesEnabled=true"),
            OsStr::new(&ua_arg),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: true,
            sandbox: false,
            window_size: Some(self.window_size),
            idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
            args,
            ..Default::default()
        })
        .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: HIDE_WEBDRIVER.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|err| BrowserError::Launch(format!("stealth script: {err}")))?;
        tab.set_user_agent(&self.user_agent, Some(ACCEPT_LANGUAGE), Some("Win32"))
            .map_err(|err| BrowserError::Launch(format!("user agent override: {err}")))?;

        info!("browser session opened");
        Ok(ChromeSession {
            inner: Some((browser, tab)),
        })
    }
}

pub struct ChromeSession {
    inner: Option<(Browser, Arc<Tab>)>,
}

impl ChromeSession {
    fn tab(&self) -> Result<&Arc<Tab>, BrowserError> {
        self.inner
            .as_ref()
            .map(|(_, tab)| tab)
            .ok_or(BrowserError::Closed)
    }
}

impl PageSession for ChromeSession {
    fn navigate(&self, url: &str, deadline: Duration) -> Result<(), BrowserError> {
        let tab = self.tab()?;
        tab.set_default_timeout(deadline);
        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|err| BrowserError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            })
    }

    fn scroll_height(&self) -> Result<u64, BrowserError> {
        let remote = self
            .tab()?
            .evaluate("document.body.scrollHeight", false)
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        remote
            .value
            .as_ref()
            .and_then(|value| value.as_f64())
            .map(|height| height.max(0.0) as u64)
            .ok_or_else(|| BrowserError::Script("scrollHeight was not a number".to_string()))
    }

    fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.tab()?
            .evaluate("window.scrollTo(0, document.body.scrollHeight);", false)
            .map(|_| ())
            .map_err(|err| BrowserError::Script(err.to_string()))
    }

    fn wait_for_any(&self, selectors: &[String], deadline: Duration) -> Result<(), BrowserError> {
        let joined = selectors.join(", ");
        self.tab()?
            .wait_for_element_with_custom_timeout(&joined, deadline)
            .map(|_| ())
            .map_err(|err| {
                debug!(selectors = %joined, error = %err, "element wait failed");
                BrowserError::Timeout {
                    what: joined.clone(),
                    waited: deadline,
                }
            })
    }

    fn page_source(&self) -> Result<String, BrowserError> {
        self.tab()?
            .get_content()
            .map_err(|err| BrowserError::Capture(err.to_string()))
    }

    fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.tab()?
            .capture_screenshot(
                Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|err| BrowserError::Capture(err.to_string()))
    }

    fn close(&mut self) {
        if let Some((browser, tab)) = self.inner.take() {
            drop(tab);
            drop(browser);
            info!("browser session closed");
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}

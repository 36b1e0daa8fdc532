use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use scraper::Selector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

pub const DEFAULT_LISTING_URL: &str = "https://www.eventbrite.com.au/d/australia--sydney/events/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {field} selector {selector:?}: {reason}")]
    Selector {
        field: &'static str,
        selector: String,
        reason: String,
    },
    #[error("no {0} selectors configured")]
    EmptySelectors(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listing_url: String,
    pub locale_keyword: String,
    pub selectors: SelectorConfig,
    pub fetch: FetchConfig,
    pub images: ImageConfig,
    /// Where failed-attempt screenshots and page dumps go. Defaults to the data root.
    pub diagnostics_dir: Option<PathBuf>,
    /// Also dump the successfully rendered listing to `page.html`.
    pub save_page_source: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            locale_keyword: "Sydney".to_string(),
            selectors: SelectorConfig::default(),
            fetch: FetchConfig::default(),
            images: ImageConfig::default(),
            diagnostics_dir: None,
            save_page_source: true,
        }
    }
}

impl AppConfig {
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.diagnostics_dir
            .clone()
            .unwrap_or_else(utils::data_root)
    }
}

/// Ranked selector lists, one per field. Earlier entries win.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub card: Vec<String>,
    pub title: Vec<String>,
    pub date: Vec<String>,
    pub description: Vec<String>,
    pub location: Vec<String>,
    pub link: Vec<String>,
    pub image: Vec<String>,
    pub detail_image: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: owned(&[
                r#"div[class*="event-card"]"#,
                r#"div[class*="eds-event-card"]"#,
                r#"div[class*="card"]"#,
            ]),
            title: owned(&["h2", "h3", r#"[class*="title"]"#]),
            date: owned(&["time", r#"[class*="date"]"#, r#"[class*="time"]"#]),
            description: owned(&[
                r#"[class*="description"]"#,
                r#"[class*="summary"]"#,
                r#"p:not([class*="availability"])"#,
            ]),
            location: owned(&[
                r#"[class*="location"]"#,
                r#"[class*="venue"]"#,
                r#"[class*="city"]"#,
            ]),
            link: owned(&["a[href]"]),
            image: owned(&[
                r#"img[class*="event-card__image"]"#,
                r#"img[class*="card-image"]"#,
                "img",
            ]),
            detail_image: owned(&[
                r#"img[class*="event-image"]"#,
                r#"img[class*="hero-image"]"#,
                "img",
            ]),
        }
    }
}

impl SelectorConfig {
    pub fn compile(&self) -> Result<CompiledSelectors, ConfigError> {
        let card = compile_list("card", &self.card)?;
        if card.is_empty() {
            return Err(ConfigError::EmptySelectors("card"));
        }
        Ok(CompiledSelectors {
            card,
            title: compile_list("title", &self.title)?,
            date: compile_list("date", &self.date)?,
            description: compile_list("description", &self.description)?,
            location: compile_list("location", &self.location)?,
            link: compile_list("link", &self.link)?,
            image: compile_list("image", &self.image)?,
            detail_image: compile_list("detail_image", &self.detail_image)?,
        })
    }
}

fn compile_list(field: &'static str, raw: &[String]) -> Result<Vec<Selector>, ConfigError> {
    raw.iter()
        .map(|selector| {
            Selector::parse(selector).map_err(|err| ConfigError::Selector {
                field,
                selector: selector.clone(),
                reason: err.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub card: Vec<Selector>,
    pub title: Vec<Selector>,
    pub date: Vec<Selector>,
    pub description: Vec<Selector>,
    pub location: Vec<Selector>,
    pub link: Vec<Selector>,
    pub image: Vec<Selector>,
    pub detail_image: Vec<Selector>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub page_load_timeout_secs: u64,
    pub scroll_pause_ms: u64,
    pub max_scrolls: u32,
    pub card_wait_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub detail_wait_timeout_secs: u64,
    pub detail_concurrency: usize,
    pub user_agent: String,
    pub window_size: (u32, u32),
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_secs: 60,
            scroll_pause_ms: 2_000,
            max_scrolls: 10,
            card_wait_timeout_secs: 30,
            max_attempts: 3,
            retry_backoff_secs: 5,
            detail_wait_timeout_secs: 10,
            detail_concurrency: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_size: (1920, 1080),
        }
    }
}

impl FetchConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn card_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.card_wait_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn detail_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_wait_timeout_secs)
    }

    /// Each detail worker holds a whole browser, so the pool stays small.
    pub fn worker_count(&self) -> usize {
        self.detail_concurrency.clamp(1, 8)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub download: bool,
    pub dir: PathBuf,
    pub public_prefix: String,
    pub timeout_secs: u64,
    /// Path marker of the listing site's image proxy; the remainder is a percent-encoded origin URL.
    pub cdn_proxy_marker: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            download: false,
            dir: PathBuf::from("static/images"),
            public_prefix: "/static/images".to_string(),
            timeout_secs: 10,
            cdn_proxy_marker: "img.evbuc.com/http".to_string(),
        }
    }
}

impl ImageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let data = read_config(&path)?;
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(utils::config_path())
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

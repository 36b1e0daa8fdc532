use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let root = base.join("event-scrape");
    if let Err(err) = fs::create_dir_all(&root) {
        // The subscriber may not be installed yet, so this one goes straight to stderr.
        eprintln!("failed to create data root {:?}: {err}", root);
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("events.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn log_path() -> PathBuf {
    data_root().join("scraper.log")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return;
        }
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!(parent = %parent.display(), error = %err, "failed to create parent directory");
        }
    }
}

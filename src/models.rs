use serde::{Deserialize, Serialize};

pub const NAME_CAP: usize = 80;
pub const DATE_CAP: usize = 120;
pub const DESCRIPTION_CAP: usize = 200;
pub const LOCATION_CAP: usize = 100;
pub const URL_CAP: usize = 200;

pub const UNTITLED: &str = "Untitled Event";
pub const NO_DATE: &str = "No date available";

/// Cuts `text` down to at most `cap` characters.
pub fn truncate(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

/// One card's worth of event data, alive only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    pub name: String,
    pub date: String,
    pub description: String,
    pub location: String,
    pub url: String,
    pub image_url: Option<String>,
}

impl CandidateEvent {
    pub fn mentions(&self, keyword: &str) -> bool {
        self.name.contains(keyword)
            || self.description.contains(keyword)
            || self.location.contains(keyword)
    }

    pub fn into_new_event(self) -> NewEvent {
        NewEvent {
            name: self.name,
            date: self.date,
            description: self.description,
            url: self.url,
            image_url: self.image_url,
        }
    }
}

/// Insert shape of a persisted event; storage assigns the id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    pub name: String,
    pub date: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: i64,
    pub name: String,
    pub date: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
}

impl StoredEvent {
    pub fn display_image_url(&self) -> String {
        self.image_url
            .clone()
            .unwrap_or_else(|| format!("https://picsum.photos/400/200?random={}", self.id))
    }
}

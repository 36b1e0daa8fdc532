//! Read side handed to the web front end.

use std::path::Path;

use serde::Serialize;
use tracing::error;

use crate::db::{Store, StoreError};

pub const LOAD_ERROR_MESSAGE: &str = "Error loading events. Please try again later.";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DisplayEvent {
    pub name: String,
    pub date: String,
    pub description: String,
    pub url: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventListing {
    pub events: Vec<DisplayEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventListing {
    /// What the front end gets when storage cannot be read at all.
    pub fn unavailable() -> Self {
        Self {
            events: Vec::new(),
            error: Some(LOAD_ERROR_MESSAGE.to_string()),
        }
    }
}

/// Source of persisted events; the front end only needs this one read.
pub trait EventSource {
    fn all_events(&self) -> Result<Vec<crate::models::StoredEvent>, StoreError>;
}

impl EventSource for Store {
    fn all_events(&self) -> Result<Vec<crate::models::StoredEvent>, StoreError> {
        self.list_events()
    }
}

/// Never fails: a storage error becomes an empty list plus an advisory message.
pub fn load_listing(source: &impl EventSource) -> EventListing {
    match source.all_events() {
        Ok(events) => EventListing {
            events: events
                .into_iter()
                .map(|event| DisplayEvent {
                    image_url: event.display_image_url(),
                    name: event.name,
                    date: event.date,
                    description: event.description,
                    url: event.url,
                })
                .collect(),
            error: None,
        },
        Err(err) => {
            error!(error = %err, "failed to load events");
            EventListing::unavailable()
        }
    }
}

/// Opens the database at `path` and loads it; an unopenable file gets the same
/// advisory listing as a failed read.
pub fn open_listing(path: &Path) -> EventListing {
    match Store::open(path) {
        Ok(store) => load_listing(&store),
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to open event database");
            EventListing::unavailable()
        }
    }
}

use std::collections::HashSet;

use tracing::{debug, info};

use super::SkipReason;
use crate::models::{CandidateEvent, NewEvent};

/// Owns the per-run seen-URL set and applies, in order: locale filter,
/// duplicate filter, image requirement.
pub struct ResultAssembler {
    locale: String,
    seen_urls: HashSet<String>,
}

impl ResultAssembler {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            seen_urls: HashSet::new(),
        }
    }

    /// Locale and duplicate checks. The first admitted candidate claims its URL.
    pub fn admit(&mut self, candidate: CandidateEvent) -> Result<CandidateEvent, SkipReason> {
        if !candidate.mentions(&self.locale) {
            debug!(event = %candidate.name, locale = %self.locale, "skipping event outside locale");
            return Err(SkipReason::OutsideLocale);
        }
        if !self.seen_urls.insert(candidate.url.clone()) {
            info!(event = %candidate.name, url = %candidate.url, "skipping duplicate event");
            return Err(SkipReason::Duplicate);
        }
        Ok(candidate)
    }

    pub fn require_image(candidate: CandidateEvent) -> Result<NewEvent, SkipReason> {
        if candidate.image_url.is_none() {
            return Err(SkipReason::NoImage);
        }
        info!(
            event = %candidate.name,
            image = candidate.image_url.as_deref().unwrap_or_default(),
            "scraped event"
        );
        Ok(candidate.into_new_event())
    }
}

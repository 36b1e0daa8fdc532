//! Card markup to candidate events.

use scraper::{ElementRef, Html};

use super::base;
use super::SkipReason;
use crate::config::CompiledSelectors;
use crate::models::{
    truncate, CandidateEvent, DATE_CAP, DESCRIPTION_CAP, LOCATION_CAP, NAME_CAP, NO_DATE,
    UNTITLED, URL_CAP,
};

/// Every element matching any card selector, in document order, each once.
pub fn card_elements<'a>(
    document: &'a Html,
    selectors: &CompiledSelectors,
) -> Vec<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| selectors.card.iter().any(|selector| selector.matches(element)))
        .collect()
}

/// Builds a candidate from one card. Missing fields fall back to defaults;
/// only a link that cannot be resolved against the listing URL rejects the card.
pub fn extract_card(
    card: &ElementRef<'_>,
    listing_url: &str,
    selectors: &CompiledSelectors,
) -> Result<CandidateEvent, SkipReason> {
    let name = base::ranked_text(card, &selectors.title)
        .map(|text| truncate(&text, NAME_CAP))
        .unwrap_or_else(|| UNTITLED.to_string());
    let date = base::ranked_text(card, &selectors.date)
        .map(|text| truncate(&text, DATE_CAP))
        .unwrap_or_else(|| NO_DATE.to_string());
    let description = base::ranked_text(card, &selectors.description)
        .map(|text| truncate(&text, DESCRIPTION_CAP))
        .unwrap_or_else(|| name.clone());
    let location = base::ranked_text(card, &selectors.location)
        .map(|text| truncate(&text, LOCATION_CAP))
        .unwrap_or_default();

    let url = match base::ranked_attr(card, &selectors.link, "href") {
        Some(href) => base::absolute_url(listing_url, Some(href.clone()))
            .ok_or_else(|| SkipReason::CardParse(format!("unresolvable link {href:?}")))?,
        None => listing_url.to_string(),
    };

    Ok(CandidateEvent {
        name,
        date,
        description,
        location,
        url: truncate(&url, URL_CAP),
        image_url: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;

    const LISTING: &str = "https://www.eventbrite.com.au/d/australia--sydney/events/";

    const SAMPLE_HTML: &str = r#"
    <html><body>
      <div class="discover-search-desktop-card event-card">
        <section class="event-card-details">
          <a class="event-card-link" href="/e/harbour-lights-tickets-101">
            <h3 class="Typography_root event-card__clamp-line--two">Harbour Lights Sydney</h3>
          </a>
          <p class="Typography_body-md event-card__date">Sat, 14 Jun, 7:00 pm</p>
          <p class="event-card__location">Circular Quay, Sydney</p>
          <p class="availability">Almost full</p>
        </section>
      </div>
      <div class="event-card">
        <p class="event-card__location">Newtown</p>
      </div>
      <span class="not-a-card">ignored</span>
    </body></html>
    "#;

    fn selectors() -> CompiledSelectors {
        SelectorConfig::default().compile().expect("default selectors")
    }

    fn first_card_candidate(html: &str) -> CandidateEvent {
        let document = Html::parse_document(html);
        let selectors = selectors();
        let cards = card_elements(&document, &selectors);
        extract_card(&cards[0], LISTING, &selectors).expect("card extracts")
    }

    #[test]
    fn extracts_populated_card() {
        let document = Html::parse_document(SAMPLE_HTML);
        let selectors = selectors();
        let cards = card_elements(&document, &selectors);
        assert_eq!(cards.len(), 2, "each card counted once despite matching several selectors");

        let event = extract_card(&cards[0], LISTING, &selectors).expect("extract");
        assert_eq!(event.name, "Harbour Lights Sydney");
        assert_eq!(event.date, "Sat, 14 Jun, 7:00 pm");
        assert_eq!(event.location, "Circular Quay, Sydney");
        assert_eq!(
            event.url,
            "https://www.eventbrite.com.au/e/harbour-lights-tickets-101"
        );
        // The description ranking skips `p.availability` and lands on the first plain paragraph.
        assert_eq!(event.description, "Sat, 14 Jun, 7:00 pm");
        assert_eq!(event.image_url, None);
    }

    #[test]
    fn bare_card_falls_back_to_defaults() {
        let document = Html::parse_document(SAMPLE_HTML);
        let selectors = selectors();
        let cards = card_elements(&document, &selectors);
        let event = extract_card(&cards[1], LISTING, &selectors).expect("extract");
        assert_eq!(event.name, UNTITLED);
        assert_eq!(event.date, NO_DATE);
        assert_eq!(event.url, LISTING);
        assert_eq!(event.location, "Newtown");
        assert_eq!(event.description, "Newtown");
    }

    #[test]
    fn missing_title_means_untitled_whatever_else_is_present() {
        let html = r#"
        <div class="event-card">
          <a href="/e/1"><span>link</span></a>
          <time>Fri 9pm</time>
          <div class="summary">A night out in Sydney</div>
          <div class="venue">Enmore Theatre</div>
          <img src="https://img.example/1.jpg">
        </div>"#;
        let event = first_card_candidate(html);
        assert_eq!(event.name, UNTITLED);
        assert_eq!(event.date, "Fri 9pm");
        assert_eq!(event.description, "A night out in Sydney");
    }

    #[test]
    fn description_defaults_to_name() {
        let event = first_card_candidate(
            r#"<div class="event-card"><h2>Only a name</h2></div>"#,
        );
        assert_eq!(event.description, "Only a name");
    }

    #[test]
    fn every_field_respects_its_cap() {
        let long = "word ".repeat(100);
        let html = format!(
            r#"<div class="event-card">
                 <h2>{long}</h2>
                 <time>{long}</time>
                 <div class="description">{long}</div>
                 <div class="location">{long}</div>
                 <a href="/e/{path}">go</a>
               </div>"#,
            path = "x".repeat(300)
        );
        let event = first_card_candidate(&html);
        assert_eq!(event.name.chars().count(), NAME_CAP);
        assert_eq!(event.date.chars().count(), DATE_CAP);
        assert_eq!(event.description.chars().count(), DESCRIPTION_CAP);
        assert_eq!(event.location.chars().count(), LOCATION_CAP);
        assert_eq!(event.url.chars().count(), URL_CAP);
    }

    #[test]
    fn unresolvable_link_skips_the_card() {
        let document =
            Html::parse_document(r#"<div class="event-card"><a href="/e/1">x</a></div>"#);
        let selectors = selectors();
        let cards = card_elements(&document, &selectors);
        let result = extract_card(&cards[0], "not a url", &selectors);
        assert!(matches!(result, Err(SkipReason::CardParse(_))));
    }
}

//! Image resolution: card markup first, then the event's own page.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use super::download::ImageDownloader;
use super::{base, SkipReason};
use crate::browser::{PageSession, SessionGuard, SessionLauncher};
use crate::config::{CompiledSelectors, FetchConfig};
use crate::models::CandidateEvent;

static BACKGROUND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"background-image:\s*url\(["']?(.*?)["']?\)"#).expect("valid background regex")
});
static INLINE_STYLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[style*="background-image"]"#).expect("inline style selector"));

/// `src` unless it is a data URI, then the lazy-load attributes.
fn image_source(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    if let Some(src) = value.attr("src").map(str::trim) {
        if !src.is_empty() && !src.starts_with("data:") {
            return Some(src.to_string());
        }
    }
    ["data-src", "data-lazy"]
        .iter()
        .filter_map(|attr| value.attr(attr).map(str::trim))
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
}

fn background_image(scope: &ElementRef<'_>) -> Option<String> {
    scope
        .select(&INLINE_STYLE_SELECTOR)
        .filter_map(|element| element.value().attr("style"))
        .find_map(|style| {
            BACKGROUND_RE
                .captures(style)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|url| !url.is_empty())
        })
}

/// Recovers the origin URL from an image-CDN proxy URL; anything else passes through.
pub fn decode_cdn_proxy(url: &str, marker: &str) -> String {
    if marker.is_empty() {
        return url.to_string();
    }
    let Some(start) = url.find(marker) else {
        return url.to_string();
    };
    let host_len = marker.find('/').map(|slash| slash + 1).unwrap_or(marker.len());
    let encoded = &url[start + host_len..];
    match urlencoding::decode(encoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(err) => {
            warn!(url, error = %err, "failed to decode image url");
            url.to_string()
        }
    }
}

/// Steps 1-4 of the chain against one piece of markup.
///
/// Each selector only looks at its first match; src and lazy attributes are read
/// from that same element.
///
/// `scan_backgrounds` enables the inline `background-image` lookup, which only
/// listing cards get.
pub fn from_markup(
    scope: &ElementRef<'_>,
    page_url: &str,
    image_selectors: &[Selector],
    cdn_marker: &str,
    scan_backgrounds: bool,
) -> Option<String> {
    let raw = image_selectors
        .iter()
        .find_map(|selector| scope.select(selector).next().and_then(image_source))
        .or_else(|| {
            if scan_backgrounds {
                background_image(scope)
            } else {
                None
            }
        })?;
    let absolute = base::absolute_url(page_url, Some(raw))?;
    Some(decode_cdn_proxy(&absolute, cdn_marker))
}

pub struct ImageResolver<'a, L: SessionLauncher> {
    launcher: &'a L,
    selectors: &'a CompiledSelectors,
    detail_selectors: &'a [String],
    fetch: &'a FetchConfig,
    cdn_marker: &'a str,
    downloader: Option<&'a ImageDownloader>,
}

impl<'a, L: SessionLauncher> ImageResolver<'a, L> {
    pub fn new(
        launcher: &'a L,
        selectors: &'a CompiledSelectors,
        detail_selectors: &'a [String],
        fetch: &'a FetchConfig,
        cdn_marker: &'a str,
    ) -> Self {
        Self {
            launcher,
            selectors,
            detail_selectors,
            fetch,
            cdn_marker,
            downloader: None,
        }
    }

    pub fn with_downloader(mut self, downloader: Option<&'a ImageDownloader>) -> Self {
        self.downloader = downloader;
        self
    }

    /// Finishes the chain for one candidate whose card may already have yielded an image.
    pub fn resolve(&self, mut candidate: CandidateEvent) -> Result<CandidateEvent, SkipReason> {
        if candidate.image_url.is_none() {
            info!(
                event = %candidate.name,
                url = %candidate.url,
                "no image in card, trying detail page"
            );
            candidate.image_url = self.from_detail_page(&candidate.url);
        }

        let Some(image_url) = candidate.image_url.clone() else {
            warn!(event = %candidate.name, "no valid image found, skipping");
            return Err(SkipReason::NoImage);
        };

        if let Some(downloader) = self.downloader {
            match downloader.download(&candidate.name, &image_url) {
                Ok(local) => candidate.image_url = Some(local),
                Err(err) => {
                    warn!(event = %candidate.name, error = %err, "image download failed, skipping");
                    return Err(SkipReason::ImageDownload(err.to_string()));
                }
            }
        }

        Ok(candidate)
    }

    /// Opens a dedicated session for the detail page; every failure here yields `None`.
    fn from_detail_page(&self, detail_url: &str) -> Option<String> {
        let session = match SessionGuard::open(self.launcher) {
            Ok(session) => session,
            Err(err) => {
                warn!(url = detail_url, error = %err, "detail session failed to start");
                return None;
            }
        };
        let html = match self.load_detail(&*session, detail_url) {
            Ok(html) => html,
            Err(err) => {
                warn!(url = detail_url, error = %err, "failed to fetch image from detail page");
                return None;
            }
        };
        drop(session);

        let document = Html::parse_document(&html);
        from_markup(
            &document.root_element(),
            detail_url,
            &self.selectors.detail_image,
            self.cdn_marker,
            false,
        )
    }

    fn load_detail<S: PageSession + ?Sized>(
        &self,
        session: &S,
        detail_url: &str,
    ) -> Result<String, crate::browser::BrowserError> {
        session.navigate(detail_url, self.fetch.page_load_timeout())?;
        session.wait_for_any(self.detail_selectors, self.fetch.detail_wait_timeout())?;
        session.page_source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, Script};
    use crate::config::SelectorConfig;

    const LISTING: &str = "https://www.eventbrite.com.au/d/australia--sydney/events/";
    const MARKER: &str = "img.evbuc.com/http";

    fn card_image(html: &str) -> Option<String> {
        let document = Html::parse_fragment(html);
        let selectors = SelectorConfig::default().compile().expect("selectors");
        from_markup(&document.root_element(), LISTING, &selectors.image, MARKER, true)
    }

    fn candidate(url: &str, image_url: Option<&str>) -> CandidateEvent {
        CandidateEvent {
            name: "Sydney Night Market".to_string(),
            date: "Fri".to_string(),
            description: "Sydney Night Market".to_string(),
            location: "Sydney".to_string(),
            url: url.to_string(),
            image_url: image_url.map(str::to_string),
        }
    }

    #[test]
    fn direct_src_wins() {
        assert_eq!(
            card_image(r#"<div><img class="event-card__image" src="/img/a.jpg" data-src="/img/b.jpg"></div>"#)
                .as_deref(),
            Some("https://www.eventbrite.com.au/img/a.jpg")
        );
    }

    #[test]
    fn ranked_image_selector_beats_document_order() {
        assert_eq!(
            card_image(
                r#"<div><img src="https://x.example/logo.png"><img class="card-image" src="https://x.example/cover.png"></div>"#
            )
            .as_deref(),
            Some("https://x.example/cover.png")
        );
    }

    #[test]
    fn data_uri_falls_back_to_lazy_attributes() {
        assert_eq!(
            card_image(r#"<div><img src="data:image/gif;base64,R0lG" data-lazy="https://x.example/lazy.jpg"></div>"#)
                .as_deref(),
            Some("https://x.example/lazy.jpg")
        );
    }

    #[test]
    fn placeholder_img_does_not_fall_through_to_later_images() {
        assert_eq!(
            card_image(
                r#"<div><img src="data:image/gif;base64,R0lG"><img class="organizer-avatar" src="https://x.example/avatar.png"></div>"#
            ),
            None
        );
    }

    #[test]
    fn background_image_style_is_parsed() {
        assert_eq!(
            card_image(r#"<div><div class="thumb" style="width: 10px; background-image: url('https://x.example/bg.webp')"></div></div>"#)
                .as_deref(),
            Some("https://x.example/bg.webp")
        );
    }

    #[test]
    fn proxied_cdn_url_is_decoded() {
        let proxied = "https://img.evbuc.com/https%3A%2F%2Forigin.example%2Fpic.jpg";
        assert_eq!(decode_cdn_proxy(proxied, MARKER), "https://origin.example/pic.jpg");
        assert_eq!(
            card_image(&format!(r#"<div><img src="{proxied}"></div>"#)).as_deref(),
            Some("https://origin.example/pic.jpg")
        );
        let plain = "https://cdn.example/pic.jpg";
        assert_eq!(decode_cdn_proxy(plain, MARKER), plain);
    }

    #[test]
    fn card_without_any_image_yields_none() {
        assert_eq!(card_image(r#"<div><h2>No pictures</h2></div>"#), None);
    }

    #[test]
    fn detail_page_supplies_missing_image() {
        let detail = "https://www.eventbrite.com.au/e/market-1";
        let launcher = FakeLauncher::with(Script {
            pages: [(
                detail.to_string(),
                r#"<html><body><img src="/logo.svg"><img class="hero-image" src="/hero/market.jpg"></body></html>"#.to_string(),
            )]
            .into_iter()
            .collect(),
            ..Script::default()
        });
        let selectors = SelectorConfig::default();
        let compiled = selectors.compile().expect("selectors");
        let fetch = FetchConfig::default();
        let resolver =
            ImageResolver::new(&launcher, &compiled, &selectors.detail_image, &fetch, MARKER);

        let resolved = resolver.resolve(candidate(detail, None)).expect("resolved");
        assert_eq!(
            resolved.image_url.as_deref(),
            Some("https://www.eventbrite.com.au/hero/market.jpg")
        );
        launcher.snapshot(|script| {
            assert_eq!(script.opened, 1);
            assert_eq!(script.closed, 1);
        });
    }

    #[test]
    fn failed_detail_page_drops_candidate_and_releases_session() {
        let launcher = FakeLauncher::with(Script::default());
        let selectors = SelectorConfig::default();
        let compiled = selectors.compile().expect("selectors");
        let fetch = FetchConfig::default();
        let resolver =
            ImageResolver::new(&launcher, &compiled, &selectors.detail_image, &fetch, MARKER);

        let result = resolver.resolve(candidate("https://www.eventbrite.com.au/e/nothing", None));
        assert_eq!(result, Err(SkipReason::NoImage));
        launcher.snapshot(|script| {
            assert_eq!(script.opened, 1);
            assert_eq!(script.closed, 1);
        });
    }

    #[test]
    fn card_image_skips_detail_session() {
        let launcher = FakeLauncher::with(Script::default());
        let selectors = SelectorConfig::default();
        let compiled = selectors.compile().expect("selectors");
        let fetch = FetchConfig::default();
        let resolver =
            ImageResolver::new(&launcher, &compiled, &selectors.detail_image, &fetch, MARKER);

        let resolved = resolver
            .resolve(candidate("https://e.example/1", Some("https://cdn.example/1.jpg")))
            .expect("resolved");
        assert_eq!(resolved.image_url.as_deref(), Some("https://cdn.example/1.jpg"));
        launcher.snapshot(|script| assert_eq!(script.opened, 0));
    }
}

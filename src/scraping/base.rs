use scraper::{ElementRef, Selector};

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).find_map(|node| {
        let cleaned = inner_text(node);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    })
}

/// Text of the first match, trying `selectors` in rank order.
pub fn ranked_text(element: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|selector| first_text(element, selector))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .find_map(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Attribute of the first match carrying it, trying `selectors` in rank order.
pub fn ranked_attr(element: &ElementRef<'_>, selectors: &[Selector], attr: &str) -> Option<String> {
    selectors
        .iter()
        .find_map(|selector| first_attr(element, selector, attr))
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

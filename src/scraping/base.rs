use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};

use crate::config::InstitutionConfig;
use crate::dates;
use crate::identity;
use crate::models::{Event, EventStatus, EventType};

static OG_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("og:title selector"));
static OG_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:description"]"#).expect("og:description selector")
});
static OG_IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("og:image selector"));
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2").expect("heading selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector"));
static CONTAINER_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article, main").expect("container selector"));
static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("paragraph selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("img selector"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector"));

pub const UNTITLED: &str = "(Sin título)";

pub trait Fetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request failed for {url}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status for {url}"))?;
        response
            .text()
            .with_context(|| format!("unable to read response body for {url}"))
    }
}

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .map(inner_text)
        .find(|text| !text.is_empty())
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

pub fn visible_text(document: &Html) -> String {
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if !hidden {
            parts.push(&**text);
        }
    }
    clean_text(&parts.join(" "))
}

pub fn strip_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    inner_text(parsed.root_element())
}

pub fn first_img_src(fragment: &str) -> Option<String> {
    let parsed = Html::parse_fragment(fragment);
    first_attr(&parsed.root_element(), &IMG_SELECTOR, "src")
}

pub fn pick_title(document: &Html) -> Option<String> {
    let root = document.root_element();
    first_text(&root, &HEADING_SELECTOR)
        .or_else(|| first_attr(&root, &OG_TITLE_SELECTOR, "content"))
        .or_else(|| first_text(&root, &TITLE_SELECTOR))
}

pub fn pick_description(document: &Html) -> Option<String> {
    let root = document.root_element();
    if let Some(og) = first_attr(&root, &OG_DESCRIPTION_SELECTOR, "content") {
        return Some(clean_text(&og));
    }
    let container = root.select(&CONTAINER_SELECTOR).next().unwrap_or(root);
    first_text(&container, &PARAGRAPH_SELECTOR)
}

pub fn pick_image(document: &Html, page_url: &str) -> Option<String> {
    let root = document.root_element();
    if let Some(og) = first_attr(&root, &OG_IMAGE_SELECTOR, "content") {
        return absolute_url(page_url, Some(og));
    }
    let container = root.select(&CONTAINER_SELECTOR).next().unwrap_or(root);
    absolute_url(page_url, first_attr(&container, &IMG_SELECTOR, "src"))
}

pub struct Observed {
    pub kind: EventType,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub detail_url: Option<String>,
    pub tickets_url: Option<String>,
    pub status: EventStatus,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub source: String,
}

pub fn build_event(institution: &InstitutionConfig, zone: Tz, observed: Observed) -> Event {
    let title = clean_text(&observed.title);
    let title = if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    };
    let mut event = Event::new(observed.kind, &institution.id, &institution.name, &title);
    event.description = observed.description.filter(|d| !d.trim().is_empty());
    event.image_url = observed.image_url;
    event.detail_url = observed.detail_url;
    event.tickets_url = observed.tickets_url;
    event.status = observed.status;
    event.source = Some(observed.source);

    if observed.kind.uses_datetimes() {
        let (start, end) = dates::all_day(observed.start, observed.end, zone);
        event.datetime_start = start;
        event.datetime_end = end;
    } else {
        event.date_start = observed.start;
        event.date_end = observed.end;
    }

    event.id = identity::event_id(&event);
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
    <html>
      <head>
        <title>Museo | Exposición</title>
        <meta property="og:image" content="/media/expo.jpg">
        <script>var cancelado = true;</script>
      </head>
      <body>
        <main>
          <h1>  Picasso   y la cerámica </h1>
          <p>Una mirada al taller de Vallauris.</p>
          <img src="/media/inline.jpg">
        </main>
        <style>.cancelado { color: red }</style>
      </body>
    </html>
    "#;

    #[test]
    fn picks_title_description_and_image() {
        let document = Html::parse_document(DETAIL);
        assert_eq!(
            pick_title(&document).as_deref(),
            Some("Picasso y la cerámica")
        );
        assert_eq!(
            pick_description(&document).as_deref(),
            Some("Una mirada al taller de Vallauris.")
        );
        assert_eq!(
            pick_image(&document, "https://example.org/exposiciones/ceramica").as_deref(),
            Some("https://example.org/media/expo.jpg")
        );
    }

    #[test]
    fn visible_text_skips_scripts_and_styles() {
        let document = Html::parse_document(DETAIL);
        let text = visible_text(&document);
        assert!(text.contains("Picasso y la cerámica"));
        assert!(!text.contains("cancelado"));
    }

    #[test]
    fn strips_html_fragments() {
        let fragment = r#"<p>Del 1 al 12 de <b>septiembre</b></p><img src="https://x.org/a.jpg">"#;
        assert_eq!(strip_html(fragment), "Del 1 al 12 de septiembre");
        assert_eq!(first_img_src(fragment).as_deref(), Some("https://x.org/a.jpg"));
    }

    #[test]
    fn resolves_relative_urls() {
        assert_eq!(
            absolute_url("https://example.org/a/b", Some("../c".to_string())).as_deref(),
            Some("https://example.org/c")
        );
        assert_eq!(absolute_url("https://example.org", None), None);
    }
}

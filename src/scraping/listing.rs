use std::{collections::BTreeSet, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::base::{self, Fetcher, Observed};
use super::SourceAdapter;
use crate::config::InstitutionConfig;
use crate::dates;
use crate::models::{Event, EventType};
use crate::status;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("listing link selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time").expect("time selector"));
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td, th").expect("cell selector"));

pub struct ListingAdapter {
    fetcher: Arc<dyn Fetcher>,
    max_links: usize,
}

impl ListingAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_links: usize) -> Self {
        Self { fetcher, max_links }
    }

    fn collect_listing(
        &self,
        institution: &InstitutionConfig,
        zone: Tz,
        kind: EventType,
        list_url: &str,
        hint: &str,
    ) -> Result<Vec<Event>> {
        let html = self.fetcher.get(list_url)?;
        let links = detail_links(&html, list_url, hint, self.max_links);
        info!(
            institution = %institution.id,
            %list_url,
            links = links.len(),
            hint,
            "collected detail links"
        );

        let mut events = Vec::new();
        for link in links {
            match self.fetcher.get(&link) {
                Ok(page) => events.push(parse_detail(
                    &page,
                    &link,
                    institution,
                    zone,
                    kind,
                    dates::current_year(),
                )),
                Err(err) => warn!(%link, %err, "skipping detail page"),
            }
        }
        Ok(events)
    }
}

impl SourceAdapter for ListingAdapter {
    fn name(&self) -> &'static str {
        "listing"
    }

    fn collect(&self, institution: &InstitutionConfig) -> Result<Vec<Event>> {
        let zone = institution.zone()?;
        let endpoints = &institution.endpoints;
        let listings = [
            (
                EventType::Exhibition,
                endpoints.exhibitions.as_deref(),
                institution.hints.exhibitions.as_str(),
            ),
            (
                EventType::Activity,
                endpoints.activities.as_deref(),
                institution.hints.activities.as_str(),
            ),
        ];

        let mut events = Vec::new();
        let mut errors = Vec::new();
        for (kind, url, hint) in listings {
            let Some(url) = url else { continue };
            match self.collect_listing(institution, zone, kind, url, hint) {
                Ok(mut found) => events.append(&mut found),
                Err(err) => errors.push(format!("{url}: {err:#}")),
            }
        }

        if events.is_empty() && !errors.is_empty() {
            return Err(anyhow!("listings failed: {}", errors.join("; ")));
        }
        for error in errors {
            warn!(institution = %institution.id, %error, "listing failed");
        }
        Ok(events)
    }
}

pub fn detail_links(html: &str, list_url: &str, hint: &str, max_links: usize) -> Vec<String> {
    let Ok(base) = reqwest::Url::parse(list_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut links = BTreeSet::new();

    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(mut url) = base.join(href) else {
            continue;
        };
        url.set_fragment(None);
        if url.host_str() != base.host_str() {
            continue;
        }
        let absolute = url.to_string();
        if !hint.is_empty() && !absolute.contains(hint) {
            continue;
        }
        if absolute.trim_end_matches('/') == list_url.trim_end_matches('/') {
            continue;
        }
        links.insert(absolute);
    }

    links.into_iter().take(max_links).collect()
}

/// Dates from `<time>` elements: machine `datetime` attributes first, then
/// their readable text. Two or more give a range; one gives a single day.
pub fn dates_from_time_tags(
    document: &Html,
    fallback_year: i32,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let mut found = Vec::new();
    for node in document.select(&TIME_SELECTOR) {
        let from_attr = node
            .value()
            .attr("datetime")
            .and_then(dates::parse_calendar_date);
        let date = from_attr.or_else(|| {
            dates::find_date_range(&base::inner_text(node), fallback_year).map(|r| r.start)
        });
        if let Some(date) = date {
            found.push(date);
        }
    }
    match found.as_slice() {
        [] => (None, None),
        [single] => (Some(*single), Some(*single)),
        [start, end, ..] => (Some(*start), Some(*end)),
    }
}

pub fn dates_from_table(document: &Html) -> (Option<NaiveDate>, Option<NaiveDate>) {
    for row in document.select(&ROW_SELECTOR) {
        let cells: Vec<String> = row.select(&CELL_SELECTOR).map(base::inner_text).collect();
        let Some(index) = cells
            .iter()
            .position(|cell| dates::parse_calendar_date(cell).is_some())
        else {
            continue;
        };
        let end = cells.get(index + 1).map(String::as_str);
        return dates::parse_tabular_pair(&cells[index], end);
    }
    (None, None)
}

pub fn parse_detail(
    html: &str,
    url: &str,
    institution: &InstitutionConfig,
    zone: Tz,
    kind: EventType,
    fallback_year: i32,
) -> Event {
    let document = Html::parse_document(html);
    let page_text = base::visible_text(&document);

    let (mut start, mut end) = dates_from_time_tags(&document, fallback_year);
    if start.is_none() && end.is_none() {
        (start, end) = dates_from_table(&document);
    }
    if start.is_none() && end.is_none() {
        (start, end) = dates::parse_date_range_with_year(&page_text, fallback_year);
    }
    if start.is_none() {
        debug!(%url, "no dates found on detail page");
    }

    base::build_event(
        institution,
        zone,
        Observed {
            kind,
            title: base::pick_title(&document).unwrap_or_default(),
            description: base::pick_description(&document),
            image_url: base::pick_image(&document, url),
            detail_url: Some(url.to_string()),
            tickets_url: institution.endpoints.tickets.clone(),
            status: status::classify_status(&page_text),
            start,
            end,
            source: url.to_string(),
        },
    )
}

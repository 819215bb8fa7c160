use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use tracing::{info, warn};

use super::base::{self, Fetcher, Observed};
use super::SourceAdapter;
use crate::config::{FeedEndpoint, InstitutionConfig};
use crate::dates;
use crate::models::Event;
use crate::status;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Description,
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn attr(element: &BytesStart<'_>, key: &str) -> Option<String> {
    let value = element.try_get_attribute(key).ok().flatten()?;
    value
        .unescape_value()
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) => {
                let qname = e.name();
                let full = qname.as_ref();
                match local_name(full) {
                    b"item" | b"entry" => current = Some(FeedItem::default()),
                    _ if current.is_none() => {}
                    b"title" => field = Some(Field::Title),
                    b"link" => {
                        if let (Some(item), Some(href)) = (current.as_mut(), attr(e, "href")) {
                            item.link.get_or_insert(href);
                        } else {
                            field = Some(Field::Link);
                        }
                    }
                    b"description" | b"summary" | b"content" | b"encoded" => {
                        let item_has_text =
                            current.as_ref().is_some_and(|i| !i.description.is_empty());
                        // content:encoded only fills in when there was no summary
                        if !item_has_text || full == b"description" {
                            field = Some(Field::Description);
                        }
                    }
                    _ => {}
                }
            }
            Ok(XmlEvent::Empty(ref e)) => {
                if let Some(item) = current.as_mut() {
                    read_empty(item, e);
                }
            }
            Ok(XmlEvent::Text(ref e)) => {
                let text = e.unescape().context("invalid text in feed")?;
                push_text(current.as_mut(), field, &text);
            }
            Ok(XmlEvent::CData(e)) => {
                let raw = e.into_inner();
                push_text(current.as_mut(), field, &String::from_utf8_lossy(&raw));
            }
            Ok(XmlEvent::End(ref e)) => {
                let qname = e.name();
                match local_name(qname.as_ref()) {
                    b"item" | b"entry" => {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                        field = None;
                    }
                    b"title" | b"link" | b"description" | b"summary" | b"content"
                    | b"encoded" => field = None,
                    _ => {}
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(err) => {
                return Err(anyhow!(
                    "feed parse error at byte {}: {err}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn read_empty(item: &mut FeedItem, element: &BytesStart<'_>) {
    let qname = element.name();
    match local_name(qname.as_ref()) {
        b"link" => {
            if let Some(href) = attr(element, "href") {
                item.link.get_or_insert(href);
            }
        }
        b"thumbnail" | b"content" => {
            if let Some(url) = attr(element, "url") {
                item.image.get_or_insert(url);
            }
        }
        b"enclosure" => {
            let is_image = attr(element, "type").is_some_and(|t| t.starts_with("image/"));
            if let Some(url) = attr(element, "url").filter(|_| is_image) {
                item.image.get_or_insert(url);
            }
        }
        _ => {}
    }
}

fn push_text(item: Option<&mut FeedItem>, field: Option<Field>, text: &str) {
    let (Some(item), Some(field)) = (item, field) else {
        return;
    };
    let target = match field {
        Field::Title => &mut item.title,
        Field::Description => &mut item.description,
        Field::Link => {
            let link = text.trim();
            if !link.is_empty() {
                item.link.get_or_insert_with(|| link.to_string());
            }
            return;
        }
    };
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

pub struct FeedAdapter {
    fetcher: Arc<dyn Fetcher>,
}

impl FeedAdapter {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn collect_feed(
        &self,
        institution: &InstitutionConfig,
        zone: Tz,
        endpoint: &FeedEndpoint,
    ) -> Result<Vec<Event>> {
        let body = self.fetcher.get(&endpoint.url)?;
        let items = parse_feed(&body).with_context(|| format!("reading feed {}", endpoint.url))?;
        info!(institution = %institution.id, feed = %endpoint.url, items = items.len(), "feed read");
        let year = dates::current_year();
        Ok(items
            .into_iter()
            .map(|item| item_to_event(item, institution, zone, endpoint, year))
            .collect())
    }
}

pub fn item_to_event(
    item: FeedItem,
    institution: &InstitutionConfig,
    zone: Tz,
    endpoint: &FeedEndpoint,
    fallback_year: i32,
) -> Event {
    let plain = base::strip_html(&item.description);
    let title = base::clean_text(&base::strip_html(&item.title));
    let haystack = format!("{title} {plain}");
    let (start, end) = dates::parse_date_range_with_year(&haystack, fallback_year);
    let image = item
        .image
        .or_else(|| base::first_img_src(&item.description))
        .and_then(|src| match item.link.as_deref() {
            Some(link) => base::absolute_url(link, Some(src)),
            None => Some(src),
        });

    base::build_event(
        institution,
        zone,
        Observed {
            kind: endpoint.kind,
            title,
            description: Some(plain).filter(|d| !d.is_empty()),
            image_url: image,
            detail_url: item.link,
            tickets_url: institution.endpoints.tickets.clone(),
            status: status::classify_status(&haystack),
            start,
            end,
            source: endpoint.url.clone(),
        },
    )
}

impl SourceAdapter for FeedAdapter {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn collect(&self, institution: &InstitutionConfig) -> Result<Vec<Event>> {
        let zone = institution.zone()?;
        let feeds = &institution.endpoints.feeds;
        if feeds.is_empty() {
            return Err(anyhow!("no feeds configured for {}", institution.id));
        }

        let mut events = Vec::new();
        let mut errors = Vec::new();
        for endpoint in feeds {
            match self.collect_feed(institution, zone, endpoint) {
                Ok(mut found) => events.append(&mut found),
                Err(err) => errors.push(format!("{}: {err:#}", endpoint.url)),
            }
        }

        if errors.len() == feeds.len() {
            return Err(anyhow!("all feeds failed: {}", errors.join("; ")));
        }
        for error in errors {
            warn!(institution = %institution.id, %error, "feed failed");
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::config::{AdapterKind, Endpoints};
    use crate::models::{EventStatus, EventType};

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Actividades</title>
    <link>https://www.museo.test/</link>
    <item>
      <title>Taller familiar &amp; cerámica</title>
      <link>https://www.museo.test/actividades/taller</link>
      <description><![CDATA[<p>Sábado 4 de octubre de 2025.</p><img src="/media/taller.jpg">]]></description>
    </item>
    <item>
      <title>Concierto de otoño</title>
      <link>https://www.museo.test/actividades/concierto</link>
      <description>Del 18 al 19 de septiembre. Aplazado por obras.</description>
      <media:thumbnail url="https://cdn.museo.test/concierto.jpg"/>
    </item>
    <item>
      <title>Visitas guiadas</title>
      <link>https://www.museo.test/actividades/visitas</link>
      <enclosure url="https://cdn.museo.test/audio.mp3" type="audio/mpeg" length="1"/>
      <content:encoded><![CDATA[<p>Todos los domingos.</p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Exposiciones</title>
  <entry>
    <title>Grabados</title>
    <link rel="alternate" href="https://www.museo.test/exposiciones/grabados"/>
    <summary>16 septiembre 2025 – 14 julio 2026</summary>
  </entry>
</feed>"#;

    struct CannedFetcher(HashMap<String, String>);

    impl Fetcher for CannedFetcher {
        fn get(&self, url: &str) -> Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("404 for {url}"))
        }
    }

    fn institution(feeds: Vec<FeedEndpoint>) -> InstitutionConfig {
        InstitutionConfig {
            id: "thyssen".to_string(),
            name: "Museo Carmen Thyssen Málaga".to_string(),
            enabled: true,
            adapter: AdapterKind::Feed,
            timezone: None,
            endpoints: Endpoints {
                feeds,
                ..Endpoints::default()
            },
            hints: Default::default(),
        }
    }

    fn endpoint(url: &str, kind: EventType) -> FeedEndpoint {
        FeedEndpoint {
            url: url.to_string(),
            kind,
        }
    }

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS).expect("parse");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Taller familiar & cerámica");
        assert_eq!(
            items[0].link.as_deref(),
            Some("https://www.museo.test/actividades/taller")
        );
        assert!(items[0].description.contains("<img"));
        assert_eq!(
            items[1].image.as_deref(),
            Some("https://cdn.museo.test/concierto.jpg")
        );
        assert_eq!(items[2].image, None, "audio enclosures are not images");
        assert!(items[2].description.contains("domingos"));
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed(ATOM).expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].link.as_deref(),
            Some("https://www.museo.test/exposiciones/grabados")
        );
        assert_eq!(items[0].description, "16 septiembre 2025 – 14 julio 2026");
    }

    #[test]
    fn malformed_feed_is_an_error() {
        assert!(parse_feed("<rss><channel><item><title>x</item></rss>").is_err());
    }

    #[test]
    fn items_become_events() {
        let inst = institution(Vec::new());
        let feed = endpoint("https://www.museo.test/rss", EventType::Activity);
        let mut items = parse_feed(RSS).expect("parse").into_iter();

        let taller = item_to_event(items.next().expect("taller"), &inst, chrono_tz::Europe::Madrid, &feed, 2025);
        assert_eq!(taller.kind, EventType::Activity);
        assert_eq!(taller.description.as_deref(), Some("Sábado 4 de octubre de 2025."));
        assert_eq!(
            taller.image_url.as_deref(),
            Some("https://www.museo.test/media/taller.jpg")
        );
        assert_eq!(
            taller.datetime_start.map(|dt| dt.to_rfc3339()).as_deref(),
            Some("2025-10-04T00:00:00+02:00")
        );
        assert_eq!(taller.source.as_deref(), Some("https://www.museo.test/rss"));

        let concierto = item_to_event(items.next().expect("concierto"), &inst, chrono_tz::Europe::Madrid, &feed, 2025);
        assert_eq!(concierto.status, EventStatus::Postponed);
        assert_eq!(
            concierto.datetime_end.map(|dt| dt.date_naive()),
            NaiveDate::from_ymd_opt(2025, 9, 19)
        );

        let visitas = item_to_event(items.next().expect("visitas"), &inst, chrono_tz::Europe::Madrid, &feed, 2025);
        assert!(visitas.is_dateless());
    }

    #[test]
    fn collect_tolerates_one_broken_feed() {
        let inst = institution(vec![
            endpoint("https://www.museo.test/rss", EventType::Activity),
            endpoint("https://www.museo.test/atom", EventType::Exhibition),
            endpoint("https://www.museo.test/caido", EventType::Activity),
        ]);
        let pages = HashMap::from([
            ("https://www.museo.test/rss".to_string(), RSS.to_string()),
            ("https://www.museo.test/atom".to_string(), ATOM.to_string()),
        ]);
        let adapter = FeedAdapter::new(Arc::new(CannedFetcher(pages)));
        let events = adapter.collect(&inst).expect("collect");
        assert_eq!(events.len(), 4);

        let grabados = events
            .iter()
            .find(|e| e.title == "Grabados")
            .expect("atom entry");
        assert_eq!(grabados.kind, EventType::Exhibition);
        assert_eq!(grabados.date_start, NaiveDate::from_ymd_opt(2025, 9, 16));
        assert_eq!(grabados.date_end, NaiveDate::from_ymd_opt(2026, 7, 14));
    }

    #[test]
    fn collect_fails_when_every_feed_fails() {
        let inst = institution(vec![endpoint("https://www.museo.test/caido", EventType::Activity)]);
        let adapter = FeedAdapter::new(Arc::new(CannedFetcher(HashMap::new())));
        assert!(adapter.collect(&inst).is_err());
        assert!(adapter.collect(&institution(Vec::new())).is_err());
    }
}

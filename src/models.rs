use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dates;

pub const DATELESS_SENTINEL: NaiveDate = NaiveDate::MAX;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[serde(alias = "exposicion")]
    Exhibition,
    #[serde(alias = "actividad")]
    Activity,
    #[serde(alias = "permanente")]
    Permanent,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Exhibition => "exhibition",
            EventType::Activity => "activity",
            EventType::Permanent => "permanent",
        }
    }

    pub fn uses_datetimes(self) -> bool {
        matches!(self, EventType::Activity)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match dates::normalize_text(label).as_str() {
            "exhibition" | "exposicion" | "exposiciones" | "muestra" => Some(EventType::Exhibition),
            "activity" | "actividad" | "actividades" | "taller" | "talleres" | "conferencia"
            | "conferencias" => Some(EventType::Activity),
            "permanent" | "permanente" | "coleccion" | "coleccion permanente" => {
                Some(EventType::Permanent)
            }
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::from_label(s).ok_or_else(|| format!("unknown event type: {s}"))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Ongoing,
    Cancelled,
    Postponed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Postponed => "postponed",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    #[serde(default)]
    pub id: String, // sha256 of the identity key, see identity::event_key
    #[serde(rename = "type")]
    pub kind: EventType,
    pub institution_id: String,
    #[serde(default, alias = "institution")]
    pub institution_name: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, alias = "url")]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub tickets_url: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub date_start: Option<NaiveDate>,
    #[serde(default)]
    pub date_end: Option<NaiveDate>,
    #[serde(default)]
    pub datetime_start: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub datetime_end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Event {
    pub fn new(kind: EventType, institution_id: &str, institution_name: &str, title: &str) -> Self {
        Event {
            id: String::new(),
            kind,
            institution_id: institution_id.to_string(),
            institution_name: institution_name.to_string(),
            title: title.to_string(),
            description: None,
            image_url: None,
            detail_url: None,
            tickets_url: None,
            status: EventStatus::Scheduled,
            date_start: None,
            date_end: None,
            datetime_start: None,
            datetime_end: None,
            price: None,
            first_seen: None,
            last_seen: None,
            last_changed: None,
            source: None,
        }
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        if self.kind.uses_datetimes() {
            self.datetime_start.map(|dt| dt.date_naive())
        } else {
            self.date_start
        }
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        if self.kind.uses_datetimes() {
            self.datetime_end.map(|dt| dt.date_naive())
        } else {
            self.date_end
        }
    }

    pub fn is_dateless(&self) -> bool {
        self.start_date().is_none() && self.end_date().is_none()
    }

    pub fn sort_key(&self) -> (NaiveDate, &str) {
        (
            self.start_date().unwrap_or(DATELESS_SENTINEL),
            self.title.as_str(),
        )
    }

    /// Field-by-field equality ignoring `first_seen`, `last_seen` and `last_changed`.
    pub fn same_content(&self, other: &Event) -> bool {
        self.without_timestamps() == other.without_timestamps()
    }

    fn without_timestamps(&self) -> Event {
        Event {
            first_seen: None,
            last_seen: None,
            last_changed: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_manual_entry() {
        let raw = r#"{
            "type": "exposicion",
            "institution_id": "mpm",
            "institution": "Museo Picasso Málaga",
            "title": "Picasso y la cerámica",
            "url": "https://example.org/expo",
            "date_start": "2025-09-16",
            "date_end": "2026-07-14"
        }"#;
        let event: Event = serde_json::from_str(raw).expect("parse event");
        assert_eq!(event.kind, EventType::Exhibition);
        assert_eq!(event.institution_name, "Museo Picasso Málaga");
        assert_eq!(event.detail_url.as_deref(), Some("https://example.org/expo"));
        assert_eq!(event.status, EventStatus::Scheduled);
        assert!(event.id.is_empty());
        assert_eq!(event.start_date(), NaiveDate::from_ymd_opt(2025, 9, 16));
    }

    #[test]
    fn activity_dates_come_from_datetimes() {
        let mut event = Event::new(EventType::Activity, "mpm", "MPM", "Taller");
        event.date_start = NaiveDate::from_ymd_opt(2020, 1, 1);
        event.datetime_start =
            Some(DateTime::parse_from_rfc3339("2025-10-04T00:00:00+02:00").expect("rfc3339"));
        assert_eq!(event.start_date(), NaiveDate::from_ymd_opt(2025, 10, 4));
        assert_eq!(event.end_date(), None);
    }

    #[test]
    fn same_content_ignores_provenance_timestamps() {
        let a = Event::new(EventType::Exhibition, "mpm", "MPM", "Expo");
        let mut b = a.clone();
        b.first_seen = Some(Utc::now());
        b.last_seen = Some(Utc::now());
        assert!(a.same_content(&b));
        b.price = Some("9 €".to_string());
        assert!(!a.same_content(&b));
    }

    #[test]
    fn type_labels_accept_spanish_synonyms() {
        assert_eq!(EventType::from_label("Exposición"), Some(EventType::Exhibition));
        assert_eq!("actividades".parse::<EventType>(), Ok(EventType::Activity));
        assert_eq!(EventType::from_label("Colección permanente"), Some(EventType::Permanent));
        assert!(EventType::from_label("concierto").is_none());
    }
}

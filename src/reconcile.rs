use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::dates;
use crate::identity;
use crate::models::Event;

pub const MANUAL_SOURCE: &str = "manual";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub manual_overrides: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    index: HashMap<String, Event>,
}

impl Catalog {
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut index = HashMap::with_capacity(events.len());
        for mut event in events {
            identity::ensure_id(&mut event);
            index.insert(event.id.clone(), event);
        }
        Catalog { index }
    }

    pub fn merge(&mut self, incoming: Vec<Event>, now: DateTime<Utc>) -> MergeStats {
        let mut stats = MergeStats::default();
        for mut event in incoming {
            identity::ensure_id(&mut event);
            match self.index.get_mut(&event.id) {
                None => {
                    event.first_seen = Some(now);
                    event.last_seen = Some(now);
                    event.last_changed = Some(now);
                    debug!(id = %event.id, title = %event.title, "new event");
                    self.index.insert(event.id.clone(), event);
                    stats.inserted += 1;
                }
                Some(stored) if stored.same_content(&event) => {
                    stored.last_seen = Some(now);
                    stats.unchanged += 1;
                }
                Some(stored) => {
                    event.first_seen = stored.first_seen.or(Some(now));
                    event.last_seen = Some(now);
                    event.last_changed = Some(now);
                    debug!(id = %event.id, title = %event.title, "event changed");
                    *stored = event;
                    stats.updated += 1;
                }
            }
        }
        stats
    }

    pub fn retain_institutions(&mut self, allowed: &HashSet<String>) -> usize {
        let before = self.index.len();
        self.index
            .retain(|_, event| allowed.contains(&event.institution_id));
        before - self.index.len()
    }

    pub fn into_sorted(self) -> Vec<Event> {
        let mut events: Vec<Event> = self.index.into_values().collect();
        sort_events(&mut events);
        events
    }
}

pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Makes the date fields match the event type. Activities that only carry
/// calendar dates become all-day spans in `tz`; dated types keep the calendar
/// part of any date-times they were given.
pub fn conform_dates(event: &mut Event, tz: Tz) {
    if event.kind.uses_datetimes() {
        let (start, end) = dates::all_day(event.date_start, event.date_end, tz);
        event.datetime_start = event.datetime_start.or(start);
        event.datetime_end = event.datetime_end.or(end);
        event.date_start = None;
        event.date_end = None;
    } else {
        event.date_start = event
            .date_start
            .or_else(|| event.datetime_start.map(|dt| dt.date_naive()));
        event.date_end = event
            .date_end
            .or_else(|| event.datetime_end.map(|dt| dt.date_naive()));
        event.datetime_start = None;
        event.datetime_end = None;
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    default_zone: Tz,
    zones: HashMap<String, Tz>,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub events: Vec<Event>,
    pub stats: MergeStats,
    pub pruned: usize,
}

impl Reconciler {
    pub fn new(default_zone: Tz) -> Self {
        Reconciler {
            default_zone,
            zones: HashMap::new(),
        }
    }

    pub fn with_zone(mut self, institution_id: &str, zone: Tz) -> Self {
        self.zones.insert(institution_id.to_string(), zone);
        self
    }

    pub fn zone_for(&self, institution_id: &str) -> Tz {
        self.zones
            .get(institution_id)
            .copied()
            .unwrap_or(self.default_zone)
    }

    fn prepare(&self, mut event: Event) -> Event {
        let zone = self.zone_for(&event.institution_id);
        conform_dates(&mut event, zone);
        identity::ensure_id(&mut event);
        event
    }

    pub fn layer(&self, scraped: Vec<Event>, manual: Vec<Event>) -> (Vec<Event>, usize) {
        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, Event> = HashMap::new();
        let mut overrides = 0;

        for event in scraped {
            let event = self.prepare(event);
            let id = event.id.clone();
            if by_id.insert(id.clone(), event).is_none() {
                order.push(id);
            }
        }

        for mut event in manual {
            if event.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
                event.source = Some(MANUAL_SOURCE.to_string());
            }
            let event = self.prepare(event);
            let id = event.id.clone();
            match by_id.insert(id.clone(), event) {
                Some(_) => overrides += 1,
                None => order.push(id),
            }
        }

        let layered = order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect();
        (layered, overrides)
    }

    pub fn reconcile(
        &self,
        existing: Vec<Event>,
        scraped: Vec<Event>,
        manual: Vec<Event>,
        allowed: Option<&HashSet<String>>,
        now: DateTime<Utc>,
    ) -> Reconciled {
        let mut catalog = Catalog::from_events(existing);
        let (incoming, overrides) = self.layer(scraped, manual);
        let mut stats = catalog.merge(incoming, now);
        stats.manual_overrides = overrides;
        let pruned = allowed
            .map(|allowed| catalog.retain_institutions(allowed))
            .unwrap_or(0);
        Reconciled {
            events: catalog.into_sorted(),
            stats,
            pruned,
        }
    }
}

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::dates;
use crate::models::{Event, EventStatus, EventType};
use crate::status;

const MONTH_ABBR: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sep", "oct", "nov", "dic",
];

pub const DATELESS_LABEL: &str = "fechas por confirmar";

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub show_past: bool,
    /// Inclusive window; when set, overlap with it replaces the past filter.
    pub window: Option<(NaiveDate, NaiveDate)>,
    pub institution: Option<String>,
    pub kind: Option<EventType>,
}

/// Exhibitions end on a calendar day, activities at an instant. Dateless
/// events are never past.
pub fn is_past(event: &Event, now: DateTime<Utc>, zone: Tz) -> bool {
    if event.kind.uses_datetimes() {
        match event.datetime_end.or(event.datetime_start) {
            Some(end) => end < now,
            None => false,
        }
    } else {
        let today = now.with_timezone(&zone).date_naive();
        match event.date_end.or(event.date_start) {
            Some(end) => end < today,
            None => false,
        }
    }
}

/// `zone_for` gives the zone in which each event's calendar days are read.
pub fn select<'a>(
    events: &'a [Event],
    options: &ListOptions,
    now: DateTime<Utc>,
    zone_for: impl Fn(&Event) -> Tz,
) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|event| {
            options
                .institution
                .as_deref()
                .map_or(true, |id| event.institution_id == id)
        })
        .filter(|event| options.kind.map_or(true, |kind| event.kind == kind))
        .filter(|event| match options.window {
            Some((from, to)) => dates::overlaps(event.start_date(), event.end_date(), from, to),
            None => options.show_past || !is_past(event, now, zone_for(event)),
        })
        .collect()
}

fn month_abbr(date: NaiveDate) -> &'static str {
    MONTH_ABBR[date.month0() as usize]
}

fn weekday_abbr(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lun",
        Weekday::Tue => "mar",
        Weekday::Wed => "mié",
        Weekday::Thu => "jue",
        Weekday::Fri => "vie",
        Weekday::Sat => "sáb",
        Weekday::Sun => "dom",
    }
}

pub fn fmt_date(date: NaiveDate) -> String {
    format!("{} {} {}", date.day(), month_abbr(date), date.year())
}

pub fn fmt_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    let (start, end) = match (start, end) {
        (None, None) => return DATELESS_LABEL.to_string(),
        (Some(s), None) => (s, s),
        (None, Some(e)) => (e, e),
        (Some(s), Some(e)) => (s, e),
    };
    if start == end {
        fmt_date(start)
    } else if start.year() != end.year() {
        format!("{} – {}", fmt_date(start), fmt_date(end))
    } else if start.month() != end.month() {
        format!("{} {} – {}", start.day(), month_abbr(start), fmt_date(end))
    } else {
        format!("{}–{}", start.day(), fmt_date(end))
    }
}

fn is_all_day(start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> bool {
    (start.hour(), start.minute()) == (0, 0) && (end.hour(), end.minute()) == (23, 59)
}

pub fn fmt_schedule(event: &Event) -> String {
    if !event.kind.uses_datetimes() {
        return fmt_date_range(event.date_start, event.date_end);
    }
    let (start, end) = match (event.datetime_start, event.datetime_end) {
        (None, None) => return DATELESS_LABEL.to_string(),
        (Some(s), None) => (s, s),
        (None, Some(e)) => (e, e),
        (Some(s), Some(e)) => (s, e),
    };

    let days = if start.date_naive() == end.date_naive() {
        let day = start.date_naive();
        format!("{} {}", weekday_abbr(day.weekday()), fmt_date(day))
    } else {
        fmt_date_range(Some(start.date_naive()), Some(end.date_naive()))
    };

    if is_all_day(&start, &end) {
        format!("{days} · todo el día")
    } else if start == end {
        format!("{days} · {}", start.format("%H:%M"))
    } else {
        format!("{days} · {}–{}", start.format("%H:%M"), end.format("%H:%M"))
    }
}

fn status_label(status: EventStatus) -> Option<&'static str> {
    match status {
        EventStatus::Scheduled => None,
        EventStatus::Ongoing => Some("en curso"),
        EventStatus::Cancelled => Some("cancelado"),
        EventStatus::Postponed => Some("aplazado"),
    }
}

pub fn render_line(event: &Event, today: NaiveDate) -> String {
    let mut line = format!(
        "{} · {} · {}",
        fmt_schedule(event),
        event.title,
        event.institution_name
    );
    if let Some(label) = status_label(status::effective_status(event, today)) {
        line.push_str(&format!(" [{label}]"));
    }
    line
}

use chrono::NaiveDate;

use crate::dates::normalize_text;
use crate::models::{Event, EventStatus};

const CANCELLED_WORDS: [&str; 6] = [
    "cancelado",
    "cancelada",
    "suspendido",
    "suspendida",
    "anulado",
    "anulada",
];

const POSTPONED_WORDS: [&str; 4] = ["aplazado", "aplazada", "pospuesto", "pospuesta"];

pub fn classify_status(text: &str) -> EventStatus {
    let normalized = normalize_text(text);
    if CANCELLED_WORDS.iter().any(|w| normalized.contains(w)) {
        EventStatus::Cancelled
    } else if POSTPONED_WORDS.iter().any(|w| normalized.contains(w)) {
        EventStatus::Postponed
    } else {
        EventStatus::Scheduled
    }
}

/// Status to display on `today`: a scheduled event whose span covers today
/// reads as ongoing.
pub fn effective_status(event: &Event, today: NaiveDate) -> EventStatus {
    if event.status != EventStatus::Scheduled {
        return event.status;
    }
    match (event.start_date(), event.end_date()) {
        (Some(start), Some(end)) if start <= today && today <= end => EventStatus::Ongoing,
        _ => EventStatus::Scheduled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;

    #[test]
    fn cancellation_beats_postponement() {
        assert_eq!(
            classify_status("Concierto SUSPENDIDO y aplazado"),
            EventStatus::Cancelled
        );
        assert_eq!(classify_status("Actividad cancelada"), EventStatus::Cancelled);
    }

    #[test]
    fn postponement_keywords() {
        assert_eq!(
            classify_status("La visita ha sido pospuesta"),
            EventStatus::Postponed
        );
    }

    #[test]
    fn defaults_to_scheduled() {
        assert_eq!(classify_status("Taller familiar"), EventStatus::Scheduled);
        assert_eq!(classify_status(""), EventStatus::Scheduled);
    }

    #[test]
    fn negated_phrasing_still_matches() {
        assert_eq!(
            classify_status("El taller no ha sido cancelado"),
            EventStatus::Cancelled
        );
    }

    #[test]
    fn exhibitions_covering_today_are_ongoing() {
        let mut event = Event::new(EventType::Exhibition, "mpm", "MPM", "Expo");
        event.date_start = NaiveDate::from_ymd_opt(2025, 9, 16);
        event.date_end = NaiveDate::from_ymd_opt(2026, 7, 14);
        let inside = NaiveDate::from_ymd_opt(2025, 12, 1).expect("date");
        let after = NaiveDate::from_ymd_opt(2026, 8, 1).expect("date");
        assert_eq!(effective_status(&event, inside), EventStatus::Ongoing);
        assert_eq!(effective_status(&event, after), EventStatus::Scheduled);

        event.status = EventStatus::Cancelled;
        assert_eq!(effective_status(&event, inside), EventStatus::Cancelled);
    }
}

use sha2::{Digest, Sha256};

use crate::models::Event;

pub fn event_key(event: &Event) -> String {
    let locator = match event.detail_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => event.title.trim().to_string(),
    };

    let (start, end) = if event.kind.uses_datetimes() {
        (
            event.datetime_start.map(|dt| dt.to_rfc3339()),
            event.datetime_end.map(|dt| dt.to_rfc3339()),
        )
    } else {
        (
            event.date_start.map(|d| d.to_string()),
            event.date_end.map(|d| d.to_string()),
        )
    };

    [
        event.kind.as_str().to_string(),
        event.institution_id.trim().to_string(),
        locator,
        start.unwrap_or_default(),
        end.unwrap_or_default(),
    ]
    .join("|")
    .to_lowercase()
}

pub fn event_id(event: &Event) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_key(event).as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn ensure_id(event: &mut Event) {
    if event.id.trim().is_empty() {
        event.id = event_id(event);
    }
}

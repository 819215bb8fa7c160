use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::Event;
use crate::utils;

pub struct Store {
    catalog_path: PathBuf,
    manual_path: PathBuf,
    fallback_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Primary(PathBuf),
    Fallback { path: PathBuf, primary_error: String },
}

impl Store {
    pub fn new(catalog_path: PathBuf, manual_path: PathBuf) -> Self {
        Store {
            catalog_path,
            manual_path,
            fallback_path: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Store {
            catalog_path: settings.catalog_path.clone(),
            manual_path: settings.manual_path.clone(),
            fallback_path: settings.fallback_path.clone(),
        }
    }

    pub fn with_fallback(mut self, path: PathBuf) -> Self {
        self.fallback_path = Some(path);
        self
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// Missing or blank file is an empty catalog. A malformed file is an
    /// error: treating it as empty would reset every `first_seen`.
    pub fn load_catalog(&self) -> Result<Vec<Event>> {
        match read_optional(&self.catalog_path)? {
            None => Ok(Vec::new()),
            Some(contents) => serde_json::from_str(&contents).map_err(|source| Error::Json {
                path: self.catalog_path.clone(),
                source,
            }),
        }
    }

    /// Manual overrides are best effort: an unreadable file means no
    /// overrides, and an entry that does not fit the schema is skipped alone.
    pub fn load_manual(&self) -> Vec<Event> {
        let contents = match read_optional(&self.manual_path) {
            Ok(Some(contents)) => contents,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(%err, "manual overrides unreadable; ignoring");
                return Vec::new();
            }
        };
        let entries: Vec<Value> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = ?self.manual_path, %err, "manual overrides malformed; ignoring");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Event>(entry) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(path = ?self.manual_path, index, %err, "skipping manual entry");
                    None
                }
            })
            .collect()
    }

    pub fn persist_catalog(&self, events: &[Event]) -> Result<PersistOutcome> {
        let primary_err = match write_json_atomic(&self.catalog_path, &events) {
            Ok(()) => {
                info!(path = ?self.catalog_path, count = events.len(), "catalog written");
                return Ok(PersistOutcome::Primary(self.catalog_path.clone()));
            }
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback_path else {
            return Err(primary_err);
        };
        warn!(%primary_err, ?fallback, "primary catalog write failed; using fallback");
        match write_json_atomic(fallback, &events) {
            Ok(()) => Ok(PersistOutcome::Fallback {
                path: fallback.clone(),
                primary_error: primary_err.to_string(),
            }),
            Err(fallback_err) => Err(Error::Persist {
                primary: self.catalog_path.clone(),
                reason: format!("{primary_err}; fallback: {fallback_err}"),
            }),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(None),
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::io(path, err)),
    }
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).map_err(|err| Error::io(&tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| Error::io(path, err))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::EventType;

    fn store_in(dir: &Path) -> Store {
        Store::new(dir.join("events.json"), dir.join("manual_events.json"))
    }

    fn sample() -> Event {
        let mut event = Event::new(EventType::Exhibition, "mpm", "Museo Picasso Málaga", "Cerámica");
        event.id = "abc".to_string();
        event.date_start = NaiveDate::from_ymd_opt(2025, 9, 16);
        event
    }

    #[test]
    fn missing_and_blank_files_are_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        assert!(store.load_catalog().expect("load").is_empty());
        assert!(store.load_manual().is_empty());

        fs::write(dir.path().join("events.json"), "  \n").expect("write");
        assert!(store.load_catalog().expect("load").is_empty());
    }

    #[test]
    fn malformed_catalog_is_an_error_but_manual_is_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        fs::write(dir.path().join("events.json"), "{not json").expect("write");
        fs::write(dir.path().join("manual_events.json"), "[{]").expect("write");
        assert!(matches!(store.load_catalog(), Err(Error::Json { .. })));
        assert!(store.load_manual().is_empty());
    }

    #[test]
    fn bad_manual_entries_are_skipped_one_by_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let raw = r#"[
            {"type": "exposicion", "institution_id": "mpm", "title": "Cerámica"},
            {"id": "abc", "price": "5 €"},
            {"type": "actividad", "institution_id": "mpm", "title": "Taller", "status": "sold-out"},
            {"type": "actividad", "institution_id": "mpm", "title": "Concierto", "status": "cancelled"}
        ]"#;
        fs::write(dir.path().join("manual_events.json"), raw).expect("write");

        let manual = store.load_manual();
        let titles: Vec<&str> = manual.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Cerámica", "Concierto"]);
        assert_eq!(manual[0].kind, EventType::Exhibition);
    }

    #[test]
    fn persists_utf8_pretty_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir.path().join("nested"));
        let outcome = store.persist_catalog(&[sample()]).expect("persist");
        assert_eq!(outcome, PersistOutcome::Primary(store.catalog_path().to_path_buf()));

        let raw = fs::read_to_string(store.catalog_path()).expect("read");
        assert!(raw.contains("Museo Picasso Málaga"));
        assert!(raw.contains("\"date_start\": \"2025-09-16\""));
        assert!(!dir.path().join("nested/events.json.tmp").exists());

        let loaded = store.load_catalog().expect("load");
        assert_eq!(loaded, vec![sample()]);
    }

    #[test]
    fn falls_back_when_primary_is_unwritable() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory where the catalog file should be makes the rename fail.
        let primary = dir.path().join("events.json");
        fs::create_dir_all(primary.join("occupied")).expect("mkdir");
        let fallback = dir.path().join("fallback/events.json");
        let store = Store::new(primary, dir.path().join("manual_events.json"))
            .with_fallback(fallback.clone());

        match store.persist_catalog(&[sample()]).expect("fallback persist") {
            PersistOutcome::Fallback { path, .. } => assert_eq!(path, fallback),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(fallback.exists());
    }

    #[test]
    fn unwritable_without_fallback_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let primary = dir.path().join("events.json");
        fs::create_dir_all(primary.join("occupied")).expect("mkdir");
        let store = Store::new(primary, dir.path().join("manual_events.json"));
        assert!(store.persist_catalog(&[sample()]).is_err());
    }
}

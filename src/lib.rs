pub mod config;
pub mod dates;
pub mod error;
pub mod identity;
pub mod models;
pub mod present;
pub mod reconcile;
pub mod scraping;
pub mod status;
pub mod store;
mod utils;

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use config::{InstitutionsFile, Settings};
use error::{Error, Result};
use reconcile::MergeStats;
use scraping::{AdapterRegistry, SourceReport};
use store::{PersistOutcome, Store};

pub use models::{Event, EventStatus, EventType};

#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    pub only: Option<String>,
    pub prune_disabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunCounts {
    pub total: usize,
    pub scraped: usize,
    pub manual: usize,
    pub failed_sources: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub generated_at: DateTime<Utc>,
    pub active_institutions: Vec<String>,
    pub counts: RunCounts,
    pub merge: MergeStats,
    pub pruned: usize,
    pub sources: Vec<SourceReport>,
}

/// Outcome of a run. A failed catalog write is carried in `persisted`
/// alongside the merged events, which stay usable by the caller.
#[derive(Debug)]
pub struct RunSummary {
    pub meta: RunMeta,
    pub events: Vec<Event>,
    pub persisted: Result<PersistOutcome>,
}

impl RunSummary {
    pub fn catalog_path(&self) -> Option<&Path> {
        match &self.persisted {
            Ok(PersistOutcome::Primary(path)) => Some(path),
            Ok(PersistOutcome::Fallback { path, .. }) => Some(path),
            Err(_) => None,
        }
    }
}

pub fn collect_and_persist(
    settings: &Settings,
    institutions: &InstitutionsFile,
    registry: &AdapterRegistry,
    options: &CollectOptions,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let active: Vec<_> = institutions
        .enabled()
        .filter(|inst| options.only.as_deref().map_or(true, |id| inst.id == id))
        .collect();
    if let Some(only) = options.only.as_ref().filter(|_| active.is_empty()) {
        return Err(Error::UnknownInstitution(only.clone()));
    }

    let (scraped, sources) = registry.run_all(active.iter().copied());
    let scraped_count = scraped.len();
    let failed_sources = sources.iter().filter(|r| r.failed()).count();

    let store = Store::from_settings(settings);
    let existing = store.load_catalog()?;
    let manual = store.load_manual();
    let manual_count = manual.len();

    let reconciler = institutions.reconciler()?;
    let allowed: Option<HashSet<String>> = options
        .prune_disabled
        .then(|| institutions.enabled_ids());
    let reconciled = reconciler.reconcile(existing, scraped, manual, allowed.as_ref(), now);

    info!(
        total = reconciled.events.len(),
        inserted = reconciled.stats.inserted,
        updated = reconciled.stats.updated,
        unchanged = reconciled.stats.unchanged,
        manual_overrides = reconciled.stats.manual_overrides,
        pruned = reconciled.pruned,
        failed_sources,
        "catalog reconciled"
    );

    let persisted = store.persist_catalog(&reconciled.events);
    if let Err(err) = &persisted {
        warn!(%err, "catalog not persisted");
    }

    let meta = RunMeta {
        generated_at: now,
        active_institutions: active.iter().map(|inst| inst.id.clone()).collect(),
        counts: RunCounts {
            total: reconciled.events.len(),
            scraped: scraped_count,
            manual: manual_count,
            failed_sources,
        },
        merge: reconciled.stats,
        pruned: reconciled.pruned,
        sources,
    };
    if let Err(err) = store::write_json_atomic(&settings.meta_path, &meta) {
        warn!(path = ?settings.meta_path, %err, "run metadata not written");
    }

    Ok(RunSummary {
        meta,
        events: reconciled.events,
        persisted,
    })
}

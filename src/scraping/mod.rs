pub mod base;
pub mod feed;
pub mod listing;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AdapterKind, InstitutionConfig};
use crate::models::Event;

use base::Fetcher;
use feed::FeedAdapter;
use listing::ListingAdapter;

pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn collect(&self, institution: &InstitutionConfig) -> anyhow::Result<Vec<Event>>;
}

/// What one adapter call produced. A failure contributes no events and does
/// not stop the run.
#[derive(Debug)]
pub enum AdapterOutcome {
    Collected(Vec<Event>),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceReport {
    pub institution_id: String,
    pub adapter: String,
    pub collected: usize,
    pub by_type: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn new(institution_id: &str, adapter: &str, outcome: &AdapterOutcome) -> Self {
        let mut report = SourceReport {
            institution_id: institution_id.to_string(),
            adapter: adapter.to_string(),
            collected: 0,
            by_type: BTreeMap::new(),
            error: None,
        };
        match outcome {
            AdapterOutcome::Collected(events) => {
                report.collected = events.len();
                for event in events {
                    *report
                        .by_type
                        .entry(event.kind.as_str().to_string())
                        .or_default() += 1;
                }
            }
            AdapterOutcome::Failed(reason) => report.error = Some(reason.clone()),
        }
        report
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub adapter: String,
    pub enabled: bool,
}

pub fn list_sources(institutions: &[InstitutionConfig]) -> Vec<SourceInfo> {
    institutions
        .iter()
        .map(|inst| SourceInfo {
            id: inst.id.clone(),
            name: inst.name.clone(),
            adapter: inst.adapter.as_str().to_string(),
            enabled: inst.enabled,
        })
        .collect()
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_institutions(
        institutions: &[InstitutionConfig],
        fetcher: Arc<dyn Fetcher>,
        max_detail_links: usize,
    ) -> Self {
        let listing: Arc<dyn SourceAdapter> =
            Arc::new(ListingAdapter::new(fetcher.clone(), max_detail_links));
        let feed: Arc<dyn SourceAdapter> = Arc::new(FeedAdapter::new(fetcher));

        let mut registry = Self::new();
        for institution in institutions {
            let adapter = match institution.adapter {
                AdapterKind::Listing => listing.clone(),
                AdapterKind::Feed => feed.clone(),
            };
            registry.register(&institution.id, adapter);
        }
        registry
    }

    pub fn register(&mut self, institution_id: &str, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(institution_id.to_string(), adapter);
    }

    pub fn get(&self, institution_id: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(institution_id)
    }

    pub fn collect(&self, institution: &InstitutionConfig) -> (AdapterOutcome, SourceReport) {
        let Some(adapter) = self.get(&institution.id) else {
            let outcome = AdapterOutcome::Failed(format!(
                "no adapter registered for {}",
                institution.id
            ));
            warn!(institution = %institution.id, "no adapter registered");
            let report = SourceReport::new(&institution.id, "none", &outcome);
            return (outcome, report);
        };

        let outcome = match adapter.collect(institution) {
            Ok(events) => {
                info!(
                    institution = %institution.id,
                    adapter = adapter.name(),
                    count = events.len(),
                    "source collected"
                );
                AdapterOutcome::Collected(events)
            }
            Err(err) => {
                warn!(
                    institution = %institution.id,
                    adapter = adapter.name(),
                    error = %format!("{err:#}"),
                    "source failed"
                );
                AdapterOutcome::Failed(format!("{err:#}"))
            }
        };
        let report = SourceReport::new(&institution.id, adapter.name(), &outcome);
        (outcome, report)
    }

    pub fn run_all<'a, I>(&self, institutions: I) -> (Vec<Event>, Vec<SourceReport>)
    where
        I: IntoIterator<Item = &'a InstitutionConfig>,
    {
        let mut events = Vec::new();
        let mut reports = Vec::new();
        for institution in institutions {
            let (outcome, report) = self.collect(institution);
            if let AdapterOutcome::Collected(mut found) = outcome {
                events.append(&mut found);
            }
            reports.push(report);
        }
        (events, reports)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::anyhow;

    use super::*;
    use crate::models::EventType;

    pub struct StaticAdapter {
        pub events: Option<Vec<Event>>,
    }

    impl SourceAdapter for StaticAdapter {
        fn name(&self) -> &'static str {
            "static"
        }

        fn collect(&self, institution: &InstitutionConfig) -> anyhow::Result<Vec<Event>> {
            self.events
                .clone()
                .ok_or_else(|| anyhow!("{} is unreachable", institution.id))
        }
    }

    pub fn institution(id: &str, enabled: bool) -> InstitutionConfig {
        InstitutionConfig {
            id: id.to_string(),
            name: format!("Museo {id}"),
            enabled,
            adapter: AdapterKind::Listing,
            timezone: None,
            endpoints: Default::default(),
            hints: Default::default(),
        }
    }

    pub fn event(institution_id: &str, kind: EventType, title: &str) -> Event {
        let mut event = Event::new(kind, institution_id, &format!("Museo {institution_id}"), title);
        event.source = Some(format!("https://{institution_id}.test/"));
        crate::identity::ensure_id(&mut event);
        event
    }
}

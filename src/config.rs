use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::EventType;
use crate::reconcile::Reconciler;
use crate::utils;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Madrid;
pub const DEFAULT_TIMEOUT_SECS: u64 = 25;
pub const DEFAULT_MAX_DETAIL_LINKS: usize = 60;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; MuseoAgenda/0.1)";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    Listing,
    Feed,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Listing => "listing",
            AdapterKind::Feed => "feed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedEndpoint {
    pub url: String,
    #[serde(rename = "type", default = "default_feed_type")]
    pub kind: EventType,
}

fn default_feed_type() -> EventType {
    EventType::Activity
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub exhibitions: Option<String>,
    pub activities: Option<String>,
    pub tickets: Option<String>,
    pub feeds: Vec<FeedEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LinkHints {
    pub exhibitions: String,
    pub activities: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstitutionConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub adapter: AdapterKind,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub hints: LinkHints,
}

impl InstitutionConfig {
    pub fn zone(&self) -> Result<Tz> {
        match self.timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_TIMEZONE),
            Some(name) => name.parse::<Tz>().map_err(|_| Error::UnknownTimezone {
                institution: self.id.clone(),
                zone: name.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InstitutionsFile {
    pub institutions: Vec<InstitutionConfig>,
}

impl InstitutionsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::parse(&contents, path)
    }

    pub fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let file: InstitutionsFile =
            serde_yaml::from_str(contents).map_err(|source| Error::Config {
                path: origin.to_path_buf(),
                source,
            })?;
        for institution in &file.institutions {
            institution.zone()?;
        }
        Ok(file)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &InstitutionConfig> {
        self.institutions.iter().filter(|inst| inst.enabled)
    }

    pub fn enabled_ids(&self) -> HashSet<String> {
        self.enabled().map(|inst| inst.id.clone()).collect()
    }

    pub fn reconciler(&self) -> Result<Reconciler> {
        let mut reconciler = Reconciler::new(DEFAULT_TIMEZONE);
        for institution in &self.institutions {
            reconciler = reconciler.with_zone(&institution.id, institution.zone()?);
        }
        Ok(reconciler)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub institutions_path: PathBuf,
    pub catalog_path: PathBuf,
    pub manual_path: PathBuf,
    pub meta_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_detail_links: usize,
}

impl Settings {
    pub fn rooted_at(data_dir: &Path) -> Self {
        Settings {
            institutions_path: data_dir.join("institutions.yaml"),
            catalog_path: data_dir.join("events.json"),
            manual_path: data_dir.join("manual_events.json"),
            meta_path: data_dir.join("meta.json"),
            fallback_path: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_detail_links: DEFAULT_MAX_DETAIL_LINKS,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::rooted_at(&utils::data_root())
    }
}

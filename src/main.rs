use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use museo_agenda::{
    collect_and_persist,
    config::{self, InstitutionsFile, Settings},
    dates, present,
    reconcile::Reconciler,
    scraping::{self, base::HttpFetcher, AdapterRegistry},
    store::{PersistOutcome, Store},
    CollectOptions, Event, EventType,
};

#[derive(Parser, Debug)]
#[command(name = "museo-agenda", version, about = "Museum event catalog aggregator")]
struct Cli {
    /// Directory holding institutions.yaml, events.json, manual_events.json and meta.json.
    #[arg(long, env = "MUSEO_AGENDA_DATA", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    institutions: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    manual: Option<PathBuf>,

    /// Where to write the catalog when the primary path is not writable.
    #[arg(long, env = "MUSEO_AGENDA_FALLBACK", value_name = "FILE")]
    fallback: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "MUSEO_AGENDA_TIMEOUT", default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Maximum detail pages followed per listing.
    #[arg(long, default_value_t = config::DEFAULT_MAX_DETAIL_LINKS)]
    max_links: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every enabled adapter and merge the results into the catalog.
    Collect {
        /// Only collect this institution.
        #[arg(long)]
        institution: Option<String>,

        /// Drop catalog entries of institutions that are no longer enabled.
        #[arg(long)]
        prune_disabled: bool,
    },
    /// Print catalog entries, upcoming only unless asked otherwise.
    List {
        #[arg(long)]
        past: bool,

        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<NaiveDate>,

        #[arg(long, value_name = "YYYY-MM-DD")]
        to: Option<NaiveDate>,

        #[arg(long)]
        institution: Option<String>,

        /// exhibition, activity or permanent (Spanish labels accepted).
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<EventType>,
    },
    /// Show how a date expression is read.
    Dates {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print configured institutions and their adapters.
    Sources,
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = match &self.data_dir {
            Some(dir) => Settings::rooted_at(dir),
            None => Settings::default(),
        };
        if let Some(path) = &self.institutions {
            settings.institutions_path = path.clone();
        }
        if let Some(path) = &self.catalog {
            settings.catalog_path = path.clone();
        }
        if let Some(path) = &self.manual {
            settings.manual_path = path.clone();
        }
        settings.fallback_path = self.fallback.clone();
        settings.request_timeout = Duration::from_secs(self.timeout);
        settings.max_detail_links = self.max_links;
        settings
    }
}

fn load_institutions(settings: &Settings) -> Result<InstitutionsFile> {
    InstitutionsFile::load(&settings.institutions_path).with_context(|| {
        format!(
            "loading institutions from {}",
            settings.institutions_path.display()
        )
    })
}

fn collect(settings: &Settings, institution: Option<String>, prune_disabled: bool) -> Result<()> {
    let institutions = load_institutions(settings)?;
    let fetcher = Arc::new(HttpFetcher::new(
        settings.request_timeout,
        &settings.user_agent,
    )?);
    let registry = AdapterRegistry::for_institutions(
        &institutions.institutions,
        fetcher,
        settings.max_detail_links,
    );
    let options = CollectOptions {
        only: institution,
        prune_disabled,
    };

    let summary = collect_and_persist(settings, &institutions, &registry, &options, Utc::now())
        .context("collect run failed")?;

    for source in &summary.meta.sources {
        match &source.error {
            Some(error) => println!("{:<16} {:<8} FAILED: {error}", source.institution_id, source.adapter),
            None => {
                let by_type = source
                    .by_type
                    .iter()
                    .map(|(kind, count)| format!("{kind}={count}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!(
                    "{:<16} {:<8} {} ({by_type})",
                    source.institution_id, source.adapter, source.collected
                );
            }
        }
    }
    let counts = &summary.meta.counts;
    println!(
        "{} events ({} scraped, {} manual, {} failed sources)",
        counts.total, counts.scraped, counts.manual, counts.failed_sources,
    );
    match summary.persisted {
        Ok(PersistOutcome::Primary(path)) => println!("catalog written to {}", path.display()),
        Ok(PersistOutcome::Fallback {
            path,
            primary_error,
        }) => {
            eprintln!("primary catalog path unavailable: {primary_error}");
            println!("catalog written to {}", path.display());
        }
        Err(err) => return Err(err).context("catalog not written"),
    }
    Ok(())
}

fn list(settings: &Settings, options: present::ListOptions) -> Result<()> {
    let events = Store::from_settings(settings)
        .load_catalog()
        .context("reading catalog")?;
    let reconciler = match load_institutions(settings).and_then(|file| Ok(file.reconciler()?)) {
        Ok(reconciler) => reconciler,
        Err(err) => {
            warn!(%err, "institution zones unavailable, reading dates in {}", config::DEFAULT_TIMEZONE);
            Reconciler::new(config::DEFAULT_TIMEZONE)
        }
    };
    let zone_for = |event: &Event| reconciler.zone_for(&event.institution_id);
    let now = Utc::now();

    let selected = present::select(&events, &options, now, zone_for);
    if selected.is_empty() {
        println!("sin eventos");
    }
    for event in selected {
        let today = now.with_timezone(&zone_for(event)).date_naive();
        println!("{}", present::render_line(event, today));
    }
    Ok(())
}

fn explain_dates(text: &str) {
    let normalized = dates::normalize_text(text);
    let year = dates::current_year();
    let hit = dates::matchers()
        .iter()
        .find_map(|matcher| matcher.try_match(&normalized, year).map(|r| (matcher.name, r)));
    match hit {
        Some((name, range)) => println!(
            "{name}: {} .. {} ({})",
            range.start,
            range.end,
            present::fmt_date_range(Some(range.start), Some(range.end))
        ),
        None => println!("no date found in {normalized:?}"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();

    match cli.command {
        Command::Collect {
            institution,
            prune_disabled,
        } => collect(&settings, institution, prune_disabled),
        Command::List {
            past,
            from,
            to,
            institution,
            kind,
        } => {
            let window = match (from, to) {
                (None, None) => None,
                (from, to) => Some((from.unwrap_or(NaiveDate::MIN), to.unwrap_or(NaiveDate::MAX))),
            };
            list(
                &settings,
                present::ListOptions {
                    show_past: past,
                    window,
                    institution,
                    kind,
                },
            )
        }
        Command::Dates { text } => {
            explain_dates(&text.join(" "));
            Ok(())
        }
        Command::Sources => {
            let institutions = load_institutions(&settings)?;
            for source in scraping::list_sources(&institutions.institutions) {
                let state = if source.enabled { "enabled" } else { "disabled" };
                println!("{:<16} {:<8} {:<8} {}", source.id, source.adapter, state, source.name);
            }
            Ok(())
        }
    }
}

//! Ingestion pipeline orchestration: provision, fetch, store, then report.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hhv_adapters::{CatalogSource, HeadHunterClient, DEFAULT_BASE_URL};
use hhv_storage::{DatabaseConfig, HttpClientConfig, SchemaProvisioner, VacancyRepository};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

pub mod menu;

pub use menu::{run_menu, MenuChoice};

pub const CRATE_NAME: &str = "hhv-sync";

pub const DEFAULT_EMPLOYER_IDS: [&str; 10] = [
    "1740", "3529", "78638", "2748", "3776", "41862", "87021", "2180", "4934", "1122462",
];

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub config_path: PathBuf,
    pub config_section: String,
    pub database_name: String,
    pub admin_database: String,
    pub api_base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub request_delay: Duration,
    pub employer_delay: Duration,
    pub employer_ids: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/database.yaml"),
            config_section: hhv_storage::config::DEFAULT_SECTION.to_string(),
            database_name: "hh_vacancies".to_string(),
            admin_database: hhv_storage::provision::DEFAULT_ADMIN_DATABASE.to_string(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: "hhv-bot/0.1".to_string(),
            http_timeout_secs: 10,
            request_delay: Duration::from_millis(500),
            employer_delay: Duration::from_secs(1),
            employer_ids: DEFAULT_EMPLOYER_IDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        Self {
            config_path: lookup("HHV_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),
            config_section: lookup("HHV_CONFIG_SECTION").unwrap_or(defaults.config_section),
            database_name: lookup("HHV_DB_NAME").unwrap_or(defaults.database_name),
            admin_database: lookup("HHV_ADMIN_DB").unwrap_or(defaults.admin_database),
            api_base_url: lookup("HHV_API_BASE_URL").unwrap_or(defaults.api_base_url),
            user_agent: lookup("HHV_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: lookup("HHV_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            request_delay: millis("HHV_REQUEST_DELAY_MS", defaults.request_delay),
            employer_delay: millis("HHV_EMPLOYER_DELAY_MS", defaults.employer_delay),
            employer_ids: lookup("HHV_EMPLOYER_IDS")
                .map(|raw| parse_employer_ids(&raw))
                .filter(|ids| !ids.is_empty())
                .unwrap_or(defaults.employer_ids),
        }
    }
}

pub fn parse_employer_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Phases of one run, in order. The posting phases repeat per employer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Provisioning,
    FetchingEmployers,
    StoringEmployers,
    FetchingPostings,
    StoringPostings,
    InteractiveReporting,
    Terminated,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployerPostings {
    pub employer_id: String,
    pub fetched: usize,
    pub inserted: u64,
    pub write_failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub database: String,
    pub employers_requested: usize,
    pub employers_fetched: usize,
    pub employers_inserted: u64,
    pub postings: Vec<EmployerPostings>,
}

impl IngestSummary {
    pub fn postings_fetched(&self) -> usize {
        self.postings.iter().map(|p| p.fetched).sum()
    }

    pub fn postings_inserted(&self) -> u64 {
        self.postings.iter().map(|p| p.inserted).sum()
    }

    pub fn failed_writes(&self) -> usize {
        self.postings.iter().filter(|p| p.write_failed).count()
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    provisioner: SchemaProvisioner,
    repository: VacancyRepository,
    catalog: Box<dyn CatalogSource>,
}

impl SyncPipeline {
    /// Load connection settings from the configured file and wire the hh.ru
    /// client.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let database = DatabaseConfig::from_file(&config.config_path, &config.config_section)
            .context("loading database configuration")?;
        let catalog = HeadHunterClient::from_config(
            HttpClientConfig {
                timeout: Duration::from_secs(config.http_timeout_secs),
                user_agent: Some(config.user_agent.clone()),
            },
            config.api_base_url.clone(),
        )?
        .with_request_delay(config.request_delay);
        Ok(Self::with_parts(config, database, Box::new(catalog)))
    }

    pub fn with_parts(
        config: SyncConfig,
        database: DatabaseConfig,
        catalog: Box<dyn CatalogSource>,
    ) -> Self {
        let provisioner =
            SchemaProvisioner::new(database.clone()).with_admin_database(&config.admin_database);
        let repository = VacancyRepository::new(database, &config.database_name);
        Self {
            config,
            provisioner,
            repository,
            catalog,
        }
    }

    pub fn repository(&self) -> &VacancyRepository {
        &self.repository
    }

    /// Run every stage up to interactive reporting. Only table creation is
    /// fatal; fetch and write failures are logged and the run moves on.
    pub async fn ingest(&self, out: &mut impl Write) -> Result<IngestSummary> {
        let started_at = Utc::now();
        let database = self.config.database_name.as_str();
        let ids = &self.config.employer_ids;

        enter(Stage::Provisioning);
        writeln!(out, "Creating database and tables...")?;
        self.provisioner.provision_database(database).await;
        self.provisioner
            .provision_schema(database)
            .await
            .context("creating tables")?;

        enter(Stage::FetchingEmployers);
        writeln!(out, "Fetching data from {}...", self.catalog.source_id())?;
        let employers = self.catalog.fetch_employers(ids).await;

        enter(Stage::StoringEmployers);
        writeln!(out, "Saving employers...")?;
        let employers_inserted = match self.repository.upsert(&employers).await {
            Ok(inserted) => inserted,
            Err(err) => {
                warn!(error = %err, "storing employers failed; continuing");
                0
            }
        };

        writeln!(out, "Fetching and saving vacancies...")?;
        let mut postings = Vec::with_capacity(ids.len());
        for (index, employer_id) in ids.iter().enumerate() {
            if index > 0 && !self.config.employer_delay.is_zero() {
                tokio::time::sleep(self.config.employer_delay).await;
            }
            writeln!(out, "Processing vacancies for employer ID: {employer_id}")?;
            let span = info_span!("employer_postings", employer_id = %employer_id);
            postings.push(self.ingest_postings(employer_id).instrument(span).await);
        }

        let summary = IngestSummary {
            started_at,
            finished_at: Utc::now(),
            database: database.to_string(),
            employers_requested: ids.len(),
            employers_fetched: employers.len(),
            employers_inserted,
            postings,
        };
        info!(
            employers = summary.employers_fetched,
            postings = summary.postings_inserted(),
            failed_writes = summary.failed_writes(),
            "ingest finished"
        );
        enter(Stage::InteractiveReporting);
        Ok(summary)
    }

    async fn ingest_postings(&self, employer_id: &str) -> EmployerPostings {
        enter(Stage::FetchingPostings);
        let fetched = self.catalog.fetch_postings(employer_id).await;

        let mut result = EmployerPostings {
            employer_id: employer_id.to_string(),
            fetched: fetched.len(),
            inserted: 0,
            write_failed: false,
        };
        if fetched.is_empty() {
            return result;
        }

        enter(Stage::StoringPostings);
        match self.repository.upsert(&fetched).await {
            Ok(inserted) => result.inserted = inserted,
            Err(err) => {
                warn!(error = %err, "storing vacancies failed; continuing");
                result.write_failed = true;
            }
        }
        result
    }
}

fn enter(stage: Stage) {
    info!(?stage, "pipeline stage");
}

pub fn render_summary(summary: &IngestSummary) -> String {
    let mut lines = vec![
        format!(
            "Ingest into `{}` finished in {}s",
            summary.database,
            (summary.finished_at - summary.started_at).num_seconds()
        ),
        format!(
            "- employers: {} requested, {} fetched, {} stored",
            summary.employers_requested, summary.employers_fetched, summary.employers_inserted
        ),
        format!(
            "- vacancies: {} fetched, {} stored",
            summary.postings_fetched(),
            summary.postings_inserted()
        ),
    ];
    for item in summary.postings.iter().filter(|p| p.write_failed) {
        lines.push(format!(
            "- vacancies for employer {} were not saved",
            item.employer_id
        ));
    }
    lines.join("\n")
}

//! Remote catalog contract + the hh.ru adapter.

use std::time::Duration;

use async_trait::async_trait;
use hhv_core::{Employer, Posting};
use hhv_storage::{FetchError, HttpClientConfig, HttpFetcher};
use serde::Deserialize;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "hhv-adapters";

pub const DEFAULT_BASE_URL: &str = "https://api.hh.ru/";
pub const PAGE_SIZE: u32 = 100;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Source of employer and posting records.
///
/// Per-request failures never surface here: they are logged and the affected
/// unit of work is skipped or truncated.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// One lookup per id; failed ids are dropped, input order is kept.
    async fn fetch_employers(&self, ids: &[String]) -> Vec<Employer>;

    /// Every posting of one employer across all result pages. A failed page
    /// ends the sweep and the pages already collected are still returned.
    async fn fetch_postings(&self, employer_id: &str) -> Vec<Posting>;
}

#[derive(Debug, Clone, Deserialize)]
struct EmployerPayload {
    id: String,
    name: String,
    #[serde(default)]
    site_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VacancyPage {
    #[serde(default)]
    items: Vec<VacancyItem>,
    pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VacancyItem {
    id: String,
    name: String,
    #[serde(default)]
    salary: Option<SalaryPayload>,
    alternate_url: String,
    #[serde(default)]
    snippet: Option<SnippetPayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct SalaryPayload {
    #[serde(default)]
    from: Option<f64>,
    #[serde(default)]
    to: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnippetPayload {
    #[serde(default)]
    requirement: Option<String>,
}

/// Raw items collected by a pagination sweep.
///
/// `interrupted` carries the error that ended the sweep early; `items` then
/// holds exactly the pages fetched before it.
#[derive(Debug, Default)]
pub struct PageSweep {
    pub items: Vec<VacancyItem>,
    pub pages_fetched: u32,
    pub interrupted: Option<FetchError>,
}

impl PageSweep {
    fn push_page(&mut self, page: VacancyPage) {
        self.items.extend(page.items);
        self.pages_fetched += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct HeadHunterClient {
    http: HttpFetcher,
    base_url: String,
    request_delay: Duration,
}

impl HeadHunterClient {
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn from_config(config: HttpClientConfig, base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self::new(HttpFetcher::new(config)?, base_url))
    }

    /// Pause inserted between consecutive requests of one batch or sweep.
    pub fn with_request_delay(mut self, request_delay: Duration) -> Self {
        self.request_delay = request_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn pace(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    async fn fetch_employer(&self, employer_id: &str) -> Result<Employer, FetchError> {
        let url = format!("{}/employers/{}", self.base_url, employer_id);
        let payload: EmployerPayload = self.http.fetch_json(&url, &[]).await?;
        Ok(normalize_employer(payload))
    }

    /// Walk result pages from 0 until the reported page count is reached or a
    /// request fails.
    pub async fn sweep_postings(&self, employer_id: &str) -> PageSweep {
        let url = format!("{}/vacancies", self.base_url);
        let mut sweep = PageSweep::default();
        let mut page = 0u32;

        loop {
            let query = [
                ("employer_id", employer_id.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            match self.http.fetch_json::<VacancyPage>(&url, &query).await {
                Ok(result) => {
                    let reported_pages = result.pages;
                    sweep.push_page(result);
                    if reported_pages <= page + 1 {
                        break;
                    }
                }
                Err(err) => {
                    warn!(employer_id, page, error = %err, "vacancy page fetch failed; keeping earlier pages");
                    sweep.interrupted = Some(err);
                    break;
                }
            }
            page += 1;
            self.pace().await;
        }

        sweep
    }
}

#[async_trait]
impl CatalogSource for HeadHunterClient {
    fn source_id(&self) -> &'static str {
        "hh.ru"
    }

    async fn fetch_employers(&self, ids: &[String]) -> Vec<Employer> {
        let mut employers = Vec::with_capacity(ids.len());
        for (index, employer_id) in ids.iter().enumerate() {
            if index > 0 {
                self.pace().await;
            }
            match self.fetch_employer(employer_id).await {
                Ok(employer) => employers.push(employer),
                Err(err) => warn!(employer_id = %employer_id, error = %err, "employer lookup failed; skipping"),
            }
        }
        info!(requested = ids.len(), fetched = employers.len(), "employers fetched");
        employers
    }

    async fn fetch_postings(&self, employer_id: &str) -> Vec<Posting> {
        let sweep = self.sweep_postings(employer_id).await;
        info!(
            employer_id,
            pages = sweep.pages_fetched,
            items = sweep.items.len(),
            complete = sweep.is_complete(),
            "vacancy sweep finished"
        );
        sweep
            .items
            .into_iter()
            .map(|item| normalize_posting(employer_id, item))
            .collect()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Zero is treated like a missing bound.
fn salary_bound(value: Option<f64>) -> Option<i32> {
    value
        .filter(|v| v.is_finite() && *v != 0.0)
        .map(|v| v.round() as i32)
}

fn normalize_employer(payload: EmployerPayload) -> Employer {
    Employer {
        employer_id: payload.id,
        name: payload.name,
        url: non_empty(payload.site_url),
        description: non_empty(payload.description),
    }
}

/// The owning employer is the one that was asked for, not read from the item.
fn normalize_posting(employer_id: &str, item: VacancyItem) -> Posting {
    let (salary_from, salary_to, currency) = match item.salary {
        Some(salary) => {
            let from = salary_bound(salary.from);
            let to = salary_bound(salary.to);
            let currency = if from.is_some() || to.is_some() {
                non_empty(salary.currency)
            } else {
                None
            };
            (from, to, currency)
        }
        None => (None, None, None),
    };

    Posting {
        vacancy_id: item.id,
        employer_id: employer_id.to_string(),
        title: item.name,
        salary_from,
        salary_to,
        currency,
        url: item.alternate_url,
        requirements: non_empty(item.snippet.and_then(|s| s.requirement)),
    }
}

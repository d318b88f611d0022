//! Postgres persistence + HTTP fetch utilities for the vacancy harvester.

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

pub mod config;
pub mod provision;
pub mod repository;

pub use config::{ConfigError, DatabaseConfig};
pub use provision::SchemaProvisioner;
pub use repository::{ReportQueries, TableRow, VacancyRepository};

pub const CRATE_NAME: &str = "hhv-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: Some("hhv-bot/0.1".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// Issue a single GET and decode the JSON body. No retries: any transport
    /// failure, non-2xx status or undecodable body is returned to the caller.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).query(query).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(status_error(status, final_url));
            }

            let body = resp.bytes().await?;
            serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                url: final_url,
                source,
            })
        }
        .instrument(span)
        .await
    }
}

fn status_error(status: StatusCode, url: String) -> FetchError {
    FetchError::HttpStatus {
        status: status.as_u16(),
        url,
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connecting to database `{database}`: {source}")]
    Connect {
        database: String,
        source: sqlx::Error,
    },
    #[error("{context}: {source}")]
    Query {
        context: String,
        source: sqlx::Error,
    },
    #[error("invalid database identifier `{0}`")]
    InvalidIdentifier(String),
}

impl StorageError {
    pub(crate) fn query(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |source| Self::Query { context, source }
    }
}

/// Open a dedicated connection to `database`. Every storage operation owns its
/// connection for the duration of the call and releases it on every exit path.
pub(crate) async fn connect(
    config: &DatabaseConfig,
    database: &str,
) -> Result<PgConnection, StorageError> {
    PgConnection::connect_with(&config.connect_options(database))
        .await
        .map_err(|source| StorageError::Connect {
            database: database.to_string(),
            source,
        })
}

/// Graceful close; a failed goodbye only loses the terminate message, the
/// socket is dropped either way.
pub(crate) async fn close_quietly(conn: PgConnection) {
    if let Err(err) = conn.close().await {
        warn!(error = %err, "closing database connection");
    }
}

/// Validate a database name for use as a bare DDL identifier and return it
/// double-quoted.
pub(crate) fn quoted_identifier(name: &str) -> Result<String, StorageError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || name.len() > 63 {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

//! Section-keyed connection settings loaded from a YAML file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

pub const DEFAULT_SECTION: &str = "postgresql";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("section `{section}` not found in {}", path.display())]
    MissingSection { section: String, path: PathBuf },
}

/// Server-level connection parameters. The database name is chosen per call,
/// since provisioning talks to the administrative database first.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DatabaseConfig {
    pub fn from_file(path: impl AsRef<Path>, section: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, section, path)
    }

    /// `origin` is only used to label errors.
    pub fn from_yaml_str(text: &str, section: &str, origin: &Path) -> Result<Self, ConfigError> {
        let parse_err = |source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        };
        let mut sections: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(text).map_err(parse_err)?;
        let value = sections
            .remove(section)
            .ok_or_else(|| ConfigError::MissingSection {
                section: section.to_string(),
                path: origin.to_path_buf(),
            })?;
        serde_yaml::from_value(value).map_err(parse_err)
    }

    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(database);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

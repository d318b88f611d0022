//! Database and table (re)creation.

use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::{error, info};

use crate::{close_quietly, connect, quoted_identifier, DatabaseConfig, StorageError};

pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";

/// Child table first so the foreign key never blocks the drop.
const DROP_TABLES: [&str; 2] = [
    "DROP TABLE IF EXISTS vacancies",
    "DROP TABLE IF EXISTS employers",
];

const CREATE_EMPLOYERS: &str = r#"
    CREATE TABLE employers (
        employer_id VARCHAR PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        url TEXT,
        description TEXT
    )
"#;

const CREATE_VACANCIES: &str = r#"
    CREATE TABLE vacancies (
        vacancy_id VARCHAR PRIMARY KEY,
        employer_id VARCHAR NOT NULL REFERENCES employers(employer_id),
        title VARCHAR(255) NOT NULL,
        salary_from INTEGER,
        salary_to INTEGER,
        currency VARCHAR(10),
        url TEXT NOT NULL,
        requirements TEXT
    )
"#;

#[derive(Debug, Clone)]
pub struct SchemaProvisioner {
    config: DatabaseConfig,
    admin_database: String,
}

impl SchemaProvisioner {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
        }
    }

    pub fn with_admin_database(mut self, admin_database: impl Into<String>) -> Self {
        self.admin_database = admin_database.into();
        self
    }

    /// Drop and recreate database `name` from the administrative database.
    ///
    /// Failures are logged and swallowed; a broken setup surfaces later as a
    /// connection error against `name`.
    pub async fn provision_database(&self, name: &str) {
        match self.recreate_database(name).await {
            Ok(()) => info!(database = name, "database recreated"),
            Err(err) => error!(database = name, error = %err, "creating database failed"),
        }
    }

    /// Drop and recreate the `employers` and `vacancies` tables inside one
    /// transaction. Unlike [`Self::provision_database`], errors propagate.
    pub async fn provision_schema(&self, name: &str) -> Result<(), StorageError> {
        let mut conn = connect(&self.config, name).await.inspect_err(|err| {
            error!(database = name, error = %err, "creating tables failed");
        })?;
        let result = create_tables(&mut conn).await;
        close_quietly(conn).await;

        match &result {
            Ok(()) => info!(database = name, "tables created"),
            Err(err) => error!(database = name, error = %err, "creating tables failed"),
        }
        result
    }

    async fn recreate_database(&self, name: &str) -> Result<(), StorageError> {
        let quoted = quoted_identifier(name)?;
        let mut conn = connect(&self.config, &self.admin_database).await?;
        let result = drop_and_create(&mut conn, name, &quoted).await;
        close_quietly(conn).await;
        result
    }
}

/// Each statement runs on its own outside a transaction block; Postgres
/// refuses database-level DDL inside one.
async fn drop_and_create(
    conn: &mut PgConnection,
    name: &str,
    quoted: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(name)
    .execute(&mut *conn)
    .await
    .map_err(StorageError::query("terminating sessions"))?;

    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StorageError::query("checking database existence"))?;

    if exists.is_some() {
        sqlx::raw_sql(&format!("DROP DATABASE {quoted}"))
            .execute(&mut *conn)
            .await
            .map_err(StorageError::query("dropping database"))?;
    }

    sqlx::raw_sql(&format!("CREATE DATABASE {quoted}"))
        .execute(&mut *conn)
        .await
        .map_err(StorageError::query("creating database"))?;
    Ok(())
}

async fn create_tables(conn: &mut PgConnection) -> Result<(), StorageError> {
    let mut tx = conn
        .begin()
        .await
        .map_err(StorageError::query("starting schema transaction"))?;

    for statement in DROP_TABLES.into_iter().chain([CREATE_EMPLOYERS, CREATE_VACANCIES]) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::query("executing schema statement"))?;
    }

    tx.commit()
        .await
        .map_err(StorageError::query("committing schema transaction"))
}

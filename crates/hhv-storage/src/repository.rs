//! Insert-or-ignore writes and the read-only vacancy reports.

use async_trait::async_trait;
use hhv_core::{AverageSalary, CompanyVacancyCount, Employer, Posting, VacancyListing};
use sqlx::postgres::{PgArguments, PgConnection};
use sqlx::query::Query;
use sqlx::{Connection, Postgres};
use tracing::{error, info};

use crate::{close_quietly, connect, DatabaseConfig, StorageError};

const COMPANIES_WITH_COUNTS_QUERY: &str = r#"
    SELECT e.name, COUNT(v.vacancy_id) AS vacancies_count
      FROM employers e
      LEFT JOIN vacancies v ON e.employer_id = v.employer_id
     GROUP BY e.name
     ORDER BY vacancies_count DESC
"#;

const ALL_VACANCIES_QUERY: &str = r#"
    SELECT e.name AS company, v.title, v.salary_from, v.salary_to, v.currency, v.url
      FROM vacancies v
      JOIN employers e ON v.employer_id = e.employer_id
     ORDER BY e.name, v.salary_from DESC
"#;

// Integer midpoint on purpose: rows missing either bound drop out of both
// the average and the comparison below.
const AVERAGE_SALARY_QUERY: &str = r#"
    SELECT AVG((salary_from + salary_to) / 2)::float8 AS avg_salary
      FROM vacancies
     WHERE salary_from IS NOT NULL AND salary_to IS NOT NULL
"#;

const ABOVE_AVERAGE_QUERY: &str = r#"
    SELECT e.name AS company, v.title, v.salary_from, v.salary_to, v.currency, v.url
      FROM vacancies v
      JOIN employers e ON v.employer_id = e.employer_id
     WHERE (v.salary_from + v.salary_to) / 2 > (
           SELECT AVG((salary_from + salary_to) / 2)
             FROM vacancies
            WHERE salary_from IS NOT NULL AND salary_to IS NOT NULL
     )
     ORDER BY (v.salary_from + v.salary_to) / 2 DESC
"#;

const KEYWORD_QUERY: &str = r#"
    SELECT e.name AS company, v.title, v.salary_from, v.salary_to, v.currency, v.url
      FROM vacancies v
      JOIN employers e ON v.employer_id = e.employer_id
     WHERE LOWER(v.title) LIKE '%' || LOWER($1) || '%' ESCAPE '\'
     ORDER BY e.name, v.salary_from DESC
"#;

type ListingRow = (
    String,
    String,
    Option<i32>,
    Option<i32>,
    Option<String>,
    String,
);

/// A record that maps onto one row of a persisted table.
pub trait TableRow: Send + Sync {
    const TABLE: &'static str;
    /// Column names in the order [`TableRow::bind`] pushes values.
    const COLUMNS: &'static [&'static str];

    fn bind<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments>;
}

impl TableRow for Employer {
    const TABLE: &'static str = "employers";
    const COLUMNS: &'static [&'static str] = &["employer_id", "name", "url", "description"];

    fn bind<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.employer_id)
            .bind(&self.name)
            .bind(self.url.as_deref())
            .bind(self.description.as_deref())
    }
}

impl TableRow for Posting {
    const TABLE: &'static str = "vacancies";
    const COLUMNS: &'static [&'static str] = &[
        "vacancy_id",
        "employer_id",
        "title",
        "salary_from",
        "salary_to",
        "currency",
        "url",
        "requirements",
    ];

    fn bind<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.vacancy_id)
            .bind(&self.employer_id)
            .bind(&self.title)
            .bind(self.salary_from)
            .bind(self.salary_to)
            .bind(self.currency.as_deref())
            .bind(&self.url)
            .bind(self.requirements.as_deref())
    }
}

pub(crate) fn insert_ignore_sql<R: TableRow>() -> String {
    let placeholders = (1..=R::COLUMNS.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    )
}

/// Escape LIKE metacharacters so the keyword matches as a literal substring.
pub(crate) fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The five aggregate reports offered by the interactive menu.
#[async_trait]
pub trait ReportQueries: Send + Sync {
    async fn companies_with_vacancy_counts(&self)
        -> Result<Vec<CompanyVacancyCount>, StorageError>;
    async fn all_vacancies(&self) -> Result<Vec<VacancyListing>, StorageError>;
    async fn average_salary(&self) -> Result<AverageSalary, StorageError>;
    async fn vacancies_above_average_salary(&self) -> Result<Vec<VacancyListing>, StorageError>;
    async fn vacancies_matching_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<VacancyListing>, StorageError>;
}

/// Read/write access to one target database. Holds no connection between
/// calls; each operation connects, runs and closes.
#[derive(Debug, Clone)]
pub struct VacancyRepository {
    config: DatabaseConfig,
    database: String,
}

impl VacancyRepository {
    pub fn new(config: DatabaseConfig, database: impl Into<String>) -> Self {
        Self {
            config,
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Insert every record with `ON CONFLICT DO NOTHING` in a single
    /// transaction. The first failing insert aborts the batch and nothing
    /// from it is committed. Returns the number of rows actually inserted.
    pub async fn upsert<R: TableRow>(&self, records: &[R]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = connect(&self.config, &self.database).await?;
        let result = insert_all(&mut conn, records).await;
        close_quietly(conn).await;

        match &result {
            Ok(inserted) => info!(
                table = R::TABLE,
                rows = records.len(),
                inserted,
                "upsert committed"
            ),
            Err(err) => error!(table = R::TABLE, error = %err, "upsert aborted"),
        }
        result
    }

    async fn fetch_listings(
        &self,
        sql: &'static str,
        keyword: Option<&str>,
        context: &'static str,
    ) -> Result<Vec<VacancyListing>, StorageError> {
        let mut conn = connect(&self.config, &self.database).await?;
        let mut query = sqlx::query_as::<_, ListingRow>(sql);
        if let Some(keyword) = keyword {
            query = query.bind(escape_like(keyword));
        }
        let rows = query
            .fetch_all(&mut conn)
            .await
            .map_err(StorageError::query(context));
        close_quietly(conn).await;

        Ok(rows?
            .into_iter()
            .map(
                |(company, title, salary_from, salary_to, currency, url)| VacancyListing {
                    company,
                    title,
                    salary_from,
                    salary_to,
                    currency,
                    url,
                },
            )
            .collect())
    }
}

async fn insert_all<R: TableRow>(
    conn: &mut PgConnection,
    records: &[R],
) -> Result<u64, StorageError> {
    let sql = insert_ignore_sql::<R>();
    let mut tx = conn
        .begin()
        .await
        .map_err(StorageError::query("starting insert transaction"))?;

    let mut inserted = 0;
    for record in records {
        let done = record
            .bind(sqlx::query(&sql))
            .execute(&mut *tx)
            .await
            .map_err(StorageError::query(format!("inserting into {}", R::TABLE)))?;
        inserted += done.rows_affected();
    }

    tx.commit()
        .await
        .map_err(StorageError::query("committing insert transaction"))?;
    Ok(inserted)
}

#[async_trait]
impl ReportQueries for VacancyRepository {
    async fn companies_with_vacancy_counts(
        &self,
    ) -> Result<Vec<CompanyVacancyCount>, StorageError> {
        let mut conn = connect(&self.config, &self.database).await?;
        let rows = sqlx::query_as::<_, (String, i64)>(COMPANIES_WITH_COUNTS_QUERY)
            .fetch_all(&mut conn)
            .await
            .map_err(StorageError::query("counting vacancies per company"));
        close_quietly(conn).await;

        Ok(rows?
            .into_iter()
            .map(|(name, vacancies_count)| CompanyVacancyCount {
                name,
                vacancies_count,
            })
            .collect())
    }

    async fn all_vacancies(&self) -> Result<Vec<VacancyListing>, StorageError> {
        self.fetch_listings(ALL_VACANCIES_QUERY, None, "listing vacancies")
            .await
    }

    async fn average_salary(&self) -> Result<AverageSalary, StorageError> {
        let mut conn = connect(&self.config, &self.database).await?;
        let avg_salary = sqlx::query_scalar::<_, Option<f64>>(AVERAGE_SALARY_QUERY)
            .fetch_one(&mut conn)
            .await
            .map_err(StorageError::query("averaging salaries"));
        close_quietly(conn).await;

        Ok(AverageSalary {
            avg_salary: avg_salary?,
        })
    }

    async fn vacancies_above_average_salary(&self) -> Result<Vec<VacancyListing>, StorageError> {
        self.fetch_listings(
            ABOVE_AVERAGE_QUERY,
            None,
            "listing vacancies above average salary",
        )
        .await
    }

    async fn vacancies_matching_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<VacancyListing>, StorageError> {
        self.fetch_listings(KEYWORD_QUERY, Some(keyword), "searching vacancies by keyword")
            .await
    }
}

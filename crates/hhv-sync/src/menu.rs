//! Text menu over the read-only vacancy reports.

use std::io::Write;

use anyhow::Result;
use hhv_core::{AverageSalary, CompanyVacancyCount, VacancyListing};
use hhv_storage::ReportQueries;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::error;

const MENU: &str = "\
Choose an action:
1. Companies and vacancy counts
2. All vacancies
3. Average salary
4. Vacancies with above-average salary
5. Search vacancies by keyword
0. Exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChoice {
    Companies,
    AllVacancies,
    AverageSalary,
    AboveAverage,
    Keyword,
    Exit,
    Invalid(String),
}

impl MenuChoice {
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "1" => Self::Companies,
            "2" => Self::AllVacancies,
            "3" => Self::AverageSalary,
            "4" => Self::AboveAverage,
            "5" => Self::Keyword,
            "0" => Self::Exit,
            other => Self::Invalid(other.to_string()),
        }
    }
}

/// Loop until `0` or end of input. Query failures are printed and the loop
/// keeps going; only I/O errors on the terminal end it.
pub async fn run_menu<Q, R, W>(queries: &Q, input: &mut R, out: &mut W) -> Result<()>
where
    Q: ReportQueries + ?Sized,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    loop {
        writeln!(out, "\n{MENU}")?;
        let Some(line) = prompt(input, out, "> ").await? else {
            return Ok(());
        };

        let choice = MenuChoice::parse(&line);
        let outcome: Result<(), ActionError> = match &choice {
            MenuChoice::Companies => match queries.companies_with_vacancy_counts().await {
                Ok(rows) => render_companies(out, &rows).map_err(Into::into),
                Err(err) => Err(err.into()),
            },
            MenuChoice::AllVacancies => match queries.all_vacancies().await {
                Ok(rows) => render_all_vacancies(out, &rows).map_err(Into::into),
                Err(err) => Err(err.into()),
            },
            MenuChoice::AverageSalary => match queries.average_salary().await {
                Ok(average) => render_average(out, average).map_err(Into::into),
                Err(err) => Err(err.into()),
            },
            MenuChoice::AboveAverage => match queries.vacancies_above_average_salary().await {
                Ok(rows) => render_above_average(out, &rows).map_err(Into::into),
                Err(err) => Err(err.into()),
            },
            MenuChoice::Keyword => {
                let Some(keyword) = prompt(input, out, "Enter a keyword to search for: ").await?
                else {
                    return Ok(());
                };
                let keyword = keyword.trim();
                match queries.vacancies_matching_keyword(keyword).await {
                    Ok(rows) => render_keyword_matches(out, keyword, &rows).map_err(Into::into),
                    Err(err) => Err(err.into()),
                }
            }
            MenuChoice::Exit => return Ok(()),
            MenuChoice::Invalid(_) => {
                writeln!(out, "Invalid choice. Please try again.")?;
                Ok(())
            }
        };

        if let Err(err) = outcome {
            report_failure(out, &choice, err)?;
        }
    }
}

/// Failures of a single menu action. Query errors are reported to the user;
/// terminal write errors abort the loop.
enum ActionError {
    Query(hhv_storage::StorageError),
    Io(std::io::Error),
}

impl From<hhv_storage::StorageError> for ActionError {
    fn from(err: hhv_storage::StorageError) -> Self {
        Self::Query(err)
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

fn report_failure(out: &mut impl Write, choice: &MenuChoice, err: ActionError) -> Result<()> {
    match err {
        ActionError::Query(err) => {
            error!(?choice, error = %err, "report query failed");
            writeln!(out, "Query failed: {err}")?;
            Ok(())
        }
        ActionError::Io(err) => Err(err.into()),
    }
}

async fn prompt<R, W>(input: &mut R, out: &mut W, text: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{text}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub fn render_companies(out: &mut impl Write, rows: &[CompanyVacancyCount]) -> std::io::Result<()> {
    for row in rows {
        writeln!(out, "{}: {} vacancies", row.name, row.vacancies_count)?;
    }
    Ok(())
}

pub fn render_all_vacancies(out: &mut impl Write, rows: &[VacancyListing]) -> std::io::Result<()> {
    for row in rows {
        writeln!(out, "{}: {} - {}", row.company, row.title, row.salary())?;
        writeln!(out, "Link: {}\n", row.url)?;
    }
    Ok(())
}

pub fn render_average(out: &mut impl Write, average: AverageSalary) -> std::io::Result<()> {
    match average.avg_salary {
        Some(avg) => writeln!(out, "Average salary: {}", avg.trunc() as i64),
        None => writeln!(out, "Not enough data to compute the average salary"),
    }
}

pub fn render_above_average(out: &mut impl Write, rows: &[VacancyListing]) -> std::io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "No vacancies with above-average salary");
    }
    writeln!(out, "Vacancies with above-average salary:")?;
    for row in rows {
        let salary = row.salary();
        let midpoint = salary.midpoint().unwrap_or_default();
        let currency = salary.currency.unwrap_or_default();
        writeln!(out, "{}: {} - {} {}", row.company, row.title, midpoint, currency)?;
        writeln!(out, "Link: {}\n", row.url)?;
    }
    Ok(())
}

pub fn render_keyword_matches(
    out: &mut impl Write,
    keyword: &str,
    rows: &[VacancyListing],
) -> std::io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "No vacancies found for '{keyword}'");
    }
    writeln!(out, "Found {} vacancies for '{keyword}':", rows.len())?;
    for row in rows {
        writeln!(out, "{}: {}", row.company, row.title)?;
        writeln!(out, "Link: {}\n", row.url)?;
    }
    Ok(())
}

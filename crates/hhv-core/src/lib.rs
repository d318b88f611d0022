//! Core domain model for the HeadHunter vacancy harvester.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "hhv-core";

/// Company record sourced from the remote catalog, keyed by its catalog id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employer {
    pub employer_id: String,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
}

/// Job listing owned by exactly one [`Employer`].
///
/// `currency` is only populated when at least one salary bound is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub vacancy_id: String,
    pub employer_id: String,
    pub title: String,
    pub salary_from: Option<i32>,
    pub salary_to: Option<i32>,
    pub currency: Option<String>,
    pub url: String,
    pub requirements: Option<String>,
}

impl Posting {
    pub fn salary(&self) -> SalaryRange<'_> {
        SalaryRange {
            from: self.salary_from,
            to: self.salary_to,
            currency: self.currency.as_deref(),
        }
    }
}

/// Row of the "companies and vacancy counts" report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyVacancyCount {
    pub name: String,
    pub vacancies_count: i64,
}

/// Posting projected together with its employer's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacancyListing {
    pub company: String,
    pub title: String,
    pub salary_from: Option<i32>,
    pub salary_to: Option<i32>,
    pub currency: Option<String>,
    pub url: String,
}

impl VacancyListing {
    pub fn salary(&self) -> SalaryRange<'_> {
        SalaryRange {
            from: self.salary_from,
            to: self.salary_to,
            currency: self.currency.as_deref(),
        }
    }
}

/// Single-row result of the average salary report.
///
/// `avg_salary` is `None` when no posting carries both salary bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AverageSalary {
    pub avg_salary: Option<f64>,
}

/// Borrowed view over a posting's salary bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalaryRange<'a> {
    pub from: Option<i32>,
    pub to: Option<i32>,
    pub currency: Option<&'a str>,
}

impl SalaryRange<'_> {
    /// `(from + to) / 2`, defined only when both bounds are present.
    pub fn midpoint(&self) -> Option<f64> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some((f64::from(from) + f64::from(to)) / 2.0),
            _ => None,
        }
    }
}

impl fmt::Display for SalaryRange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let currency = self.currency.unwrap_or_default();
        let text = match (self.from, self.to) {
            (Some(from), Some(to)) => format!("from {from} to {to} {currency}"),
            (Some(from), None) => format!("from {from} {currency}"),
            (None, Some(to)) => format!("up to {to} {currency}"),
            (None, None) => return f.write_str("not specified"),
        };
        f.write_str(text.trim_end())
    }
}

//! Integration tests for VacancyRepository writes and reports.

use hhv_core::CompanyVacancyCount;
use hhv_storage::ReportQueries;

use crate::integration::common::{employer, posting, setup_test_db};

#[tokio::test]
#[ignore = "requires Docker"]
async fn upsert_same_employer_twice_keeps_one_row() {
    let db = setup_test_db().await;
    let first = employer("1740", "Yandex");
    let mut renamed = first.clone();
    renamed.name = "Renamed".to_string();

    assert_eq!(db.repo.upsert(&[first.clone()]).await.unwrap(), 1);
    assert_eq!(db.repo.upsert(&[first]).await.unwrap(), 0);
    assert_eq!(db.repo.upsert(&[renamed]).await.unwrap(), 0);
    assert_eq!(db.count("employers").await, 1);

    let counts = db.repo.companies_with_vacancy_counts().await.unwrap();
    assert_eq!(counts[0].name, "Yandex", "first write wins");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn failing_insert_rolls_back_whole_batch() {
    let db = setup_test_db().await;
    db.repo.upsert(&[employer("1", "Acme")]).await.unwrap();

    let batch = [
        posting("10", "1", "Engineer", Some(100), Some(200)),
        posting("11", "missing-employer", "Orphan", None, None),
        posting("12", "1", "Designer", None, None),
    ];
    assert!(db.repo.upsert(&batch).await.is_err());
    assert_eq!(db.count("vacancies").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn employer_without_postings_is_counted_as_zero() {
    let db = setup_test_db().await;
    db.repo
        .upsert(&[employer("42", "Quiet Corp"), employer("7", "Busy Corp")])
        .await
        .unwrap();
    db.repo
        .upsert(&[
            posting("70", "7", "Engineer", None, None),
            posting("71", "7", "Analyst", None, None),
        ])
        .await
        .unwrap();

    let counts = db.repo.companies_with_vacancy_counts().await.unwrap();
    assert_eq!(
        counts,
        vec![
            CompanyVacancyCount {
                name: "Busy Corp".into(),
                vacancies_count: 2
            },
            CompanyVacancyCount {
                name: "Quiet Corp".into(),
                vacancies_count: 0
            },
        ]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn average_salary_ignores_postings_missing_a_bound() {
    let db = setup_test_db().await;
    db.repo.upsert(&[employer("1", "Acme")]).await.unwrap();
    assert_eq!(db.repo.average_salary().await.unwrap().avg_salary, None);

    db.repo
        .upsert(&[
            posting("a", "1", "Full range", Some(100), Some(200)),
            posting("b", "1", "Only upper", None, Some(300)),
            posting("c", "1", "Only lower", Some(400), None),
        ])
        .await
        .unwrap();

    let average = db.repo.average_salary().await.unwrap();
    assert_eq!(average.avg_salary, Some(150.0));

    // Single-bound postings still show up in the plain listing.
    assert_eq!(db.repo.all_vacancies().await.unwrap().len(), 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn only_strictly_higher_midpoints_are_above_average() {
    let db = setup_test_db().await;
    db.repo.upsert(&[employer("1", "Acme")]).await.unwrap();
    db.repo
        .upsert(&[
            posting("mid-150", "1", "Average", Some(100), Some(200)),
            posting("mid-250", "1", "Generous", Some(200), Some(300)),
            posting("mid-50", "1", "Stingy", Some(40), Some(60)),
            posting("open", "1", "Open ended", Some(900), None),
        ])
        .await
        .unwrap();

    assert_eq!(
        db.repo.average_salary().await.unwrap().avg_salary,
        Some(150.0)
    );
    let above = db.repo.vacancies_above_average_salary().await.unwrap();
    assert_eq!(above.len(), 1);
    assert_eq!(above[0].title, "Generous");
    assert_eq!(above[0].company, "Acme");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn keyword_search_is_case_insensitive_substring() {
    let db = setup_test_db().await;
    db.repo
        .upsert(&[employer("1", "Beta"), employer("2", "Alpha")])
        .await
        .unwrap();
    db.repo
        .upsert(&[
            posting("1", "1", "Senior Engineer", Some(300), Some(400)),
            posting("2", "2", "ENGINEERING LEAD", None, None),
            posting("3", "1", "Designer", None, None),
            posting("4", "2", "100% remote engineer", Some(500), None),
        ])
        .await
        .unwrap();

    let matches = db.repo.vacancies_matching_keyword("engineer").await.unwrap();
    let titles: Vec<_> = matches.iter().map(|v| v.title.as_str()).collect();
    // Ordered by company, then salary_from descending (NULLs first).
    assert_eq!(
        titles,
        vec!["ENGINEERING LEAD", "100% remote engineer", "Senior Engineer"]
    );

    let literal = db.repo.vacancies_matching_keyword("0%").await.unwrap();
    assert_eq!(literal.len(), 1);
    assert!(db
        .repo
        .vacancies_matching_keyword("_")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn all_vacancies_orders_by_company_then_salary() {
    let db = setup_test_db().await;
    db.repo
        .upsert(&[employer("1", "Zeta"), employer("2", "Acme")])
        .await
        .unwrap();
    db.repo
        .upsert(&[
            posting("z1", "1", "Z low", Some(10), Some(20)),
            posting("a1", "2", "A low", Some(10), Some(20)),
            posting("a2", "2", "A high", Some(50), Some(60)),
        ])
        .await
        .unwrap();

    let listing = db.repo.all_vacancies().await.unwrap();
    let titles: Vec<_> = listing.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, vec!["A high", "A low", "Z low"]);
    assert_eq!(listing[0].currency.as_deref(), Some("RUR"));
}

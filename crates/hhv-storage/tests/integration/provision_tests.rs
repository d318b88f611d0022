//! Integration tests for SchemaProvisioner.

use hhv_storage::{SchemaProvisioner, StorageError};

use crate::integration::common::{employer, posting, setup_test_db, TEST_DATABASE};

#[tokio::test]
#[ignore = "requires Docker"]
async fn provisioning_twice_leaves_two_empty_tables_with_foreign_key() {
    let db = setup_test_db().await;
    db.repo.upsert(&[employer("1", "Acme")]).await.unwrap();
    db.repo
        .upsert(&[posting("10", "1", "Engineer", None, None)])
        .await
        .unwrap();

    db.provisioner.provision_database(TEST_DATABASE).await;
    db.provisioner.provision_schema(TEST_DATABASE).await.unwrap();
    db.provisioner.provision_schema(TEST_DATABASE).await.unwrap();

    let mut conn = db.connection().await;
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = 'public' ORDER BY table_name",
    )
    .fetch_all(&mut conn)
    .await
    .unwrap();
    assert_eq!(tables, vec!["employers", "vacancies"]);
    assert_eq!(db.count("employers").await, 0);
    assert_eq!(db.count("vacancies").await, 0);

    let orphan = db
        .repo
        .upsert(&[posting("11", "nobody", "Orphan", None, None)])
        .await;
    assert!(matches!(orphan, Err(StorageError::Query { .. })));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn database_creation_failures_are_swallowed() {
    let db = setup_test_db().await;

    // Rejected name and unreachable admin database: both only log.
    db.provisioner.provision_database("bad-name; DROP").await;
    SchemaProvisioner::new(db.config.clone())
        .with_admin_database("no_such_admin_db")
        .provision_database("other_db")
        .await;

    assert_eq!(db.count("employers").await, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn table_creation_failure_propagates() {
    let db = setup_test_db().await;
    let err = db
        .provisioner
        .provision_schema("database_that_does_not_exist")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Connect { .. }));
}

//! Postgres container setup shared by the integration tests.

use std::time::Duration;

use hhv_core::{Employer, Posting};
use hhv_storage::{DatabaseConfig, SchemaProvisioner, VacancyRepository};
use sqlx::{Connection, PgConnection};
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

pub const TEST_DATABASE: &str = "hh_vacancies_test";

pub struct TestDatabase {
    pub config: DatabaseConfig,
    pub provisioner: SchemaProvisioner,
    pub repo: VacancyRepository,
    _container: ContainerAsync<GenericImage>,
}

/// Start Postgres, wait until it accepts connections, then provision the
/// target database and both tables.
pub async fn setup_test_db() -> TestDatabase {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let config = DatabaseConfig {
        host: host.to_string(),
        port,
        user: "postgres".to_string(),
        password: Some("postgres".to_string()),
    };

    // The image restarts once after init; wait for the final server.
    const MAX_RETRIES: u32 = 50;
    let mut retries = 0;
    loop {
        match PgConnection::connect_with(&config.connect_options("postgres")).await {
            Ok(conn) => {
                let _ = conn.close().await;
                break;
            }
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }

    let provisioner = SchemaProvisioner::new(config.clone());
    provisioner.provision_database(TEST_DATABASE).await;
    provisioner
        .provision_schema(TEST_DATABASE)
        .await
        .expect("schema provisioning should succeed");

    TestDatabase {
        repo: VacancyRepository::new(config.clone(), TEST_DATABASE),
        config,
        provisioner,
        _container: container,
    }
}

impl TestDatabase {
    pub async fn connection(&self) -> PgConnection {
        PgConnection::connect_with(&self.config.connect_options(TEST_DATABASE))
            .await
            .expect("connect to test database")
    }

    pub async fn count(&self, table: &str) -> i64 {
        let mut conn = self.connection().await;
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut conn)
            .await
            .expect("count rows")
    }
}

pub fn employer(id: &str, name: &str) -> Employer {
    Employer {
        employer_id: id.to_string(),
        name: name.to_string(),
        url: Some(format!("https://example.com/{id}")),
        description: None,
    }
}

pub fn posting(
    id: &str,
    employer_id: &str,
    title: &str,
    salary_from: Option<i32>,
    salary_to: Option<i32>,
) -> Posting {
    let currency = (salary_from.is_some() || salary_to.is_some()).then(|| "RUR".to_string());
    Posting {
        vacancy_id: id.to_string(),
        employer_id: employer_id.to_string(),
        title: title.to_string(),
        salary_from,
        salary_to,
        currency,
        url: format!("https://hh.ru/vacancy/{id}"),
        requirements: None,
    }
}

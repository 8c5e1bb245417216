//! Test utilities for integration tests.
//!
//! Provides helper functions to set up isolated PostgreSQL containers for
//! each test.

use serde_json::{Map, Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use stratus_core::{DocumentKey, Record};
use stratus_db::DocumentRepository;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Sets up a PostgreSQL container and returns a migrated repository.
///
/// Each call creates a fresh, isolated database container. The container is
/// automatically cleaned up when the returned `ContainerAsync` is dropped.
///
/// # Returns
///
/// A tuple of (DocumentRepository, PgPool, ContainerAsync) - keep the
/// container alive for the test duration.
pub async fn setup_test_db() -> (DocumentRepository, PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "postgres")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    // Create connection pool with retry logic for container startup
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!(
                        "Failed to connect to database after {} retries: {}",
                        MAX_RETRIES, e
                    );
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    let repo = DocumentRepository::new(pool.clone(), "test-db");
    repo.migrate().await.expect("Failed to run migrations");

    (repo, pool, container)
}

pub fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Creates a sample anomaly record.
pub fn sample_record(id: &str, cost_impact: f64) -> Record {
    Record::new(
        DocumentKey::new(id).unwrap(),
        fields(json!({
            "anomaly_id": id,
            "cost_impact": cost_impact,
            "project_id": "web",
        })),
    )
}

/// Creates `count` records with random cost values.
pub fn random_records(count: usize) -> Vec<Record> {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..count)
        .map(|i| sample_record(&format!("a-{:04}", i), rng.random_range(0.0..10_000.0)))
        .collect()
}

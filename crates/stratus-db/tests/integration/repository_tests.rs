//! Integration tests for DocumentRepository.
//!
//! These tests verify the repository layer against a real PostgreSQL
//! database. Each test runs in an isolated container.

use serde_json::json;
use stratus_core::{
    AppError, DocumentKey, SaveStats, StoreErrorKind, UpsertEngine, WriteBatch,
};

use crate::integration::common::{fields, random_records, setup_test_db};

const COLLECTION: &str = "cost_anomalies";

fn key(id: &str) -> DocumentKey {
    DocumentKey::new(id).unwrap()
}

/// Test 1: A merge write creates the document, then merges top-level fields.
#[tokio::test]
async fn test_merge_creates_then_merges() {
    let (repo, _pool, _container) = setup_test_db().await;

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({"status": "open", "cost_impact": 10})), true);
    repo.commit(&batch).await.expect("first commit should succeed");

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({"cost_impact": 25})), true);
    repo.commit(&batch).await.expect("second commit should succeed");

    let doc = repo
        .get(COLLECTION, "a1")
        .await
        .expect("get should succeed")
        .expect("document should exist");
    assert_eq!(doc.get("cost_impact"), Some(&json!(25)));
    assert_eq!(doc.get("status"), Some(&json!("open")), "merge should keep other fields");
}

#[tokio::test]
async fn test_replace_overwrites_document() {
    let (repo, _pool, _container) = setup_test_db().await;

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({"status": "open"})), true);
    repo.commit(&batch).await.unwrap();

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({"cost_impact": 25})), false);
    repo.commit(&batch).await.unwrap();

    let doc = repo.get(COLLECTION, "a1").await.unwrap().unwrap();
    assert_eq!(doc, fields(json!({"cost_impact": 25})));
}

#[tokio::test]
async fn test_delete_removes_document() {
    let (repo, _pool, _container) = setup_test_db().await;

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({})), true);
    batch.set(key("a2"), fields(json!({})), true);
    repo.commit(&batch).await.unwrap();

    repo.commit(&WriteBatch::deletes(COLLECTION, vec![key("a1"), key("missing")]))
        .await
        .expect("deleting a missing document should succeed");

    assert_eq!(repo.list_keys(COLLECTION).await.unwrap(), vec!["a2"]);
}

/// Test 4: A failing statement rolls back the whole batch.
#[tokio::test]
async fn test_failed_batch_is_rolled_back() {
    let (repo, _pool, _container) = setup_test_db().await;

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({"ok": true})), true);
    // PostgreSQL text cannot hold NUL bytes
    batch.set(key("bad\0key"), fields(json!({"ok": false})), true);

    let err = repo.commit(&batch).await.expect_err("commit should fail");

    match err {
        AppError::Store(details) => {
            assert_eq!(details.kind, StoreErrorKind::InvalidArgument)
        }
        other => panic!("expected store error, got {:?}", other),
    }
    assert!(
        repo.get(COLLECTION, "a1").await.unwrap().is_none(),
        "no op of a failed batch should be visible"
    );
}

#[tokio::test]
async fn test_missing_table_is_not_found() {
    let (repo, pool, _container) = setup_test_db().await;
    sqlx::query("DROP TABLE documents").execute(&pool).await.unwrap();

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({})), true);
    let err = repo.commit(&batch).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Store(ref d) if d.kind == StoreErrorKind::NotFound
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_databases_are_isolated() {
    let (repo, _pool, _container) = setup_test_db().await;
    let other = repo.with_database("other-db");

    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(key("a1"), fields(json!({"db": "test"})), true);
    repo.commit(&batch).await.unwrap();

    assert_eq!(repo.count(COLLECTION).await.unwrap(), 1);
    assert_eq!(other.count(COLLECTION).await.unwrap(), 0);
    assert!(other.fetch_documents(COLLECTION).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_documents_ordered_by_key() {
    let (repo, _pool, _container) = setup_test_db().await;

    let mut batch = WriteBatch::new("projects");
    batch.set(key("web"), fields(json!({"project_id": "web", "appcode": "APP1"})), true);
    batch.set(key("batch"), fields(json!({"project_id": "batch", "appcode": "APP2"})), true);
    repo.commit(&batch).await.unwrap();

    let docs = repo.fetch_documents("projects").await.unwrap();
    let ids: Vec<&str> = docs.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["batch", "web"]);
    assert_eq!(docs[1].1.get("appcode"), Some(&json!("APP1")));
}

/// Test 8: The engine writes bounded batches and re-running is idempotent.
#[tokio::test]
async fn test_engine_end_to_end_idempotent() {
    let (repo, _pool, _container) = setup_test_db().await;
    let engine = UpsertEngine::new(repo.clone(), COLLECTION);
    let records = random_records(1200);

    let first = engine.run(records.clone()).await.unwrap();
    let snapshot = repo.fetch_documents(COLLECTION).await.unwrap();
    let second = engine.run(records).await.unwrap();

    assert_eq!(first, SaveStats { saved: 1200, errors: 0 });
    assert_eq!(second, first);
    assert_eq!(repo.count(COLLECTION).await.unwrap(), 1200);
    assert_eq!(repo.fetch_documents(COLLECTION).await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_health_check() {
    let (repo, _pool, _container) = setup_test_db().await;
    repo.health_check().await.expect("health check should pass");
}

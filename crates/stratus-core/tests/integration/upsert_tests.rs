//! Integration tests for UpsertEngine and BatchCommitter.
//!
//! These tests verify batching, retry and accounting against an in-memory
//! store. Retry tests run with a paused clock so backoff sleeps finish
//! instantly while still advancing virtual time.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use stratus_core::{
    AppError, BatchCommitter, DocumentKey, RetryPolicy, SaveStats, StoreErrorKind, UpsertConfig,
    UpsertEngine, WriteBatch,
};

use crate::integration::common::{MockDocumentStore, RecordingReporter, fields, record, records};

const COLLECTION: &str = "cost_anomalies";

fn engine_with_batch_size(store: &MockDocumentStore, max_batch_size: usize) -> UpsertEngine<MockDocumentStore> {
    UpsertEngine::with_config(
        store.clone(),
        UpsertConfig::new(COLLECTION).with_max_batch_size(max_batch_size),
        RetryPolicy::default(),
    )
}

/// 1250 records with the default batch size are written as 500/500/250.
#[tokio::test]
async fn test_upsert_splits_into_bounded_batches() {
    // Arrange
    let store = MockDocumentStore::new();
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    // Act
    let stats = engine.run(records("a", 1250)).await.unwrap();

    // Assert
    assert_eq!(stats, SaveStats { saved: 1250, errors: 0 });
    assert_eq!(store.applied_batches(), vec![500, 500, 250], "Batches should be 500/500/250");
    assert_eq!(store.len(COLLECTION), 1250);
}

#[tokio::test]
async fn test_upsert_empty_input_makes_no_store_calls() {
    let store = MockDocumentStore::new();
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    let stats = engine.run(Vec::new()).await.unwrap();

    assert_eq!(stats, SaveStats::default());
    assert_eq!(store.commit_calls(), 0, "Empty input should not touch the store");
}

#[tokio::test]
async fn test_upsert_zero_batch_size_fails_fast() {
    let store = MockDocumentStore::new();
    let engine = engine_with_batch_size(&store, 0);

    let result = engine.run(records("a", 3)).await;

    assert!(matches!(result, Err(AppError::InvalidBatchSize(0))));
    assert_eq!(store.commit_calls(), 0);
}

/// A store that is always unavailable is tried max_retries times, then the
/// whole batch is counted as errors.
#[tokio::test(start_paused = true)]
async fn test_transient_failure_exhausts_attempts() {
    // Arrange
    let store = MockDocumentStore::new();
    store.fail_always(StoreErrorKind::Unavailable);
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    // Act
    let stats = engine.run(records("a", 10)).await.unwrap();

    // Assert
    assert_eq!(stats, SaveStats { saved: 0, errors: 10 });
    assert_eq!(store.commit_calls(), 3, "Default policy allows 3 attempts");
    assert_eq!(store.len(COLLECTION), 0);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let store = MockDocumentStore::new();
    store.fail_always(StoreErrorKind::PermissionDenied);
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    let stats = engine.run(records("a", 10)).await.unwrap();

    assert_eq!(stats, SaveStats { saved: 0, errors: 10 });
    assert_eq!(store.commit_calls(), 1, "Permanent errors should not be retried");
}

/// Two quota errors then success: the batch is saved on the third attempt
/// after two scheduled retries.
#[tokio::test(start_paused = true)]
async fn test_quota_errors_then_success() {
    // Arrange
    let store = MockDocumentStore::new();
    store.fail_next(StoreErrorKind::ResourceExhausted, 2);
    let engine = UpsertEngine::new(store.clone(), COLLECTION);
    let reporter = RecordingReporter::new();
    let started = tokio::time::Instant::now();

    // Act
    let stats = engine
        .run_with_progress(records("a", 10), &reporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(stats, SaveStats { saved: 10, errors: 0 });
    assert_eq!(store.commit_calls(), 3);
    assert_eq!(reporter.count("retry_scheduled"), 2);
    assert_eq!(reporter.count("batch_committed"), 1);

    // 1s + 2s of backoff, plus under 1s of jitter each
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
}

/// A failed batch does not stop the following batches.
#[tokio::test]
async fn test_failed_batch_does_not_stop_run() {
    // Arrange
    let store = MockDocumentStore::new();
    store.fail_next(StoreErrorKind::InvalidArgument, 1);
    let engine = engine_with_batch_size(&store, 2);
    let reporter = RecordingReporter::new();

    // Act
    let stats = engine
        .run_with_progress(records("a", 6), &reporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(stats, SaveStats { saved: 4, errors: 2 });
    assert_eq!(stats.total(), 6, "saved + errors should equal input size");
    assert_eq!(reporter.count("batch_failed"), 1);
    assert_eq!(reporter.count("batch_committed"), 2);
    assert!(store.get(COLLECTION, "a-0").is_none(), "Failed batch should not be applied");
    assert!(store.get(COLLECTION, "a-2").is_some());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = MockDocumentStore::new();
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    engine.run(records("a", 5)).await.unwrap();
    let first = store.snapshot(COLLECTION);
    engine.run(records("a", 5)).await.unwrap();
    let second = store.snapshot(COLLECTION);

    assert_eq!(first, second, "Re-running the same input should not change state");
    assert_eq!(second.len(), 5);
}

#[tokio::test]
async fn test_merge_preserves_unrelated_fields() {
    let store = MockDocumentStore::new();
    store.insert(
        COLLECTION,
        "a1",
        fields(json!({"status": "acknowledged", "cost_impact": 1.0})),
    );
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    engine
        .run(vec![record("a1", json!({"cost_impact": 250.0}))])
        .await
        .unwrap();

    let doc = store.get(COLLECTION, "a1").unwrap();
    assert_eq!(doc.get("cost_impact"), Some(&json!(250.0)));
    assert_eq!(doc.get("status"), Some(&json!("acknowledged")));
}

#[tokio::test]
async fn test_overwrite_replaces_document() {
    let store = MockDocumentStore::new();
    store.insert(COLLECTION, "a1", fields(json!({"status": "acknowledged"})));
    let engine = UpsertEngine::with_config(
        store.clone(),
        UpsertConfig::new(COLLECTION).with_merge(false),
        RetryPolicy::default(),
    );

    engine
        .run(vec![record("a1", json!({"cost_impact": 250.0}))])
        .await
        .unwrap();

    let doc = store.get(COLLECTION, "a1").unwrap();
    assert!(doc.get("status").is_none(), "Overwrite should drop old fields");
}

#[tokio::test]
async fn test_prune_stale_deletes_unseen_documents() {
    // Arrange
    let store = MockDocumentStore::new();
    for key in ["a", "b", "c"] {
        store.insert(COLLECTION, key, fields(json!({})));
    }
    let engine = UpsertEngine::new(store.clone(), COLLECTION);
    let keep: HashSet<DocumentKey> = ["a", "b"]
        .iter()
        .map(|k| DocumentKey::new(k).unwrap())
        .collect();

    // Act
    let stats = engine.prune_stale(&keep).await.unwrap();

    // Assert
    assert_eq!(stats, SaveStats { saved: 1, errors: 0 });
    assert!(store.get(COLLECTION, "c").is_none());
    assert!(store.get(COLLECTION, "a").is_some());
}

/// Ids written before key sanitization existed are deleted by their stored form.
#[tokio::test]
async fn test_prune_deletes_unsanitized_stored_ids() {
    // Arrange
    let store = MockDocumentStore::new();
    let long_id = "x".repeat(1600);
    for key in ["legacy anomaly", "2023/03/anomaly", long_id.as_str(), "kept"] {
        store.insert(COLLECTION, key, fields(json!({})));
    }
    let engine = UpsertEngine::new(store.clone(), COLLECTION);
    let keep: HashSet<DocumentKey> = ["kept", "legacy anomaly"]
        .iter()
        .map(|k| DocumentKey::new(k).unwrap())
        .collect();

    // Act
    let stats = engine.prune_stale(&keep).await.unwrap();

    // Assert
    assert_eq!(stats, SaveStats { saved: 3, errors: 0 });
    assert!(store.get(COLLECTION, "legacy anomaly").is_none());
    assert!(store.get(COLLECTION, "2023/03/anomaly").is_none());
    assert!(store.get(COLLECTION, &long_id).is_none());
    assert_eq!(store.len(COLLECTION), 1);
}

#[tokio::test]
async fn test_prune_with_nothing_stale_makes_no_commits() {
    let store = MockDocumentStore::new();
    store.insert(COLLECTION, "a", fields(json!({})));
    let engine = UpsertEngine::new(store.clone(), COLLECTION);
    let keep: HashSet<DocumentKey> = [DocumentKey::new("a").unwrap()].into_iter().collect();

    let stats = engine.prune_stale(&keep).await.unwrap();

    assert_eq!(stats, SaveStats::default());
    assert_eq!(store.commit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_committer_custom_policy_single_attempt() {
    let store = MockDocumentStore::new();
    store.fail_next(StoreErrorKind::Aborted, 1);
    let committer =
        BatchCommitter::with_policy(store.clone(), RetryPolicy::default().with_max_retries(1));
    let mut batch = WriteBatch::new(COLLECTION);
    batch.set(DocumentKey::new("k").unwrap(), fields(json!({"v": 1})), true);

    let result = committer.commit(&batch).await;

    assert!(!result.is_success());
    assert_eq!(result.attempts, 1);
    assert_eq!(result.failed_keys, vec![DocumentKey::new("k").unwrap()]);
    assert_eq!(store.commit_calls(), 1);
}

#[tokio::test]
async fn test_write_document_overwrites() {
    let store = MockDocumentStore::new();
    store.insert("meta", "latest", fields(json!({"old": true})));
    let engine = UpsertEngine::new(store.clone(), COLLECTION);

    let result = engine
        .write_document("meta", DocumentKey::new("latest").unwrap(), fields(json!({"new": true})))
        .await;

    assert!(result.is_success());
    assert_eq!(store.get("meta", "latest").unwrap(), fields(json!({"new": true})));
}

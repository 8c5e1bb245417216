//! Integration tests for Enricher.
//!
//! These tests verify the side-table cache lifecycle: lazy load, reuse,
//! explicit reload and graceful failure.

use std::sync::Arc;

use serde_json::{Value, json};
use stratus_core::{CollectionSideTable, Enricher};

use crate::integration::common::{MockDocumentStore, MockSideTable, fields, record};

fn enrichment_fields() -> Vec<String> {
    vec!["appcode".to_string(), "lob".to_string()]
}

#[tokio::test]
async fn test_cache_loaded_once_across_concurrent_calls() {
    // Arrange
    let table = MockSideTable::new(vec![json!({"project_id": "web", "appcode": "APP1", "lob": "retail"})]);
    let enricher = Arc::new(Enricher::new(table.clone(), "project_id", enrichment_fields()));

    // Act
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let enricher = Arc::clone(&enricher);
            tokio::spawn(async move {
                enricher
                    .enrich(record(&format!("a{}", i), json!({"project_id": "web"})))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let out = handle.await.unwrap();
        assert_eq!(out.get("appcode"), Some(&json!("APP1")));
    }

    // Assert
    assert_eq!(table.loads(), 1, "Side table should be loaded exactly once");
}

#[tokio::test]
async fn test_reload_replaces_cache() {
    // Arrange
    let table = MockSideTable::new(vec![json!({"project_id": "web", "appcode": "OLD"})]);
    let enricher = Enricher::new(table.clone(), "project_id", enrichment_fields());
    let before = enricher.enrich(record("a", json!({"project_id": "web"}))).await;

    // Act
    table.set_rows(vec![
        json!({"project_id": "web", "appcode": "NEW"}),
        json!({"project_id": "batch", "appcode": "BAT"}),
    ]);
    let entries = enricher.reload().await;
    let after = enricher.enrich(record("a", json!({"project_id": "web"}))).await;

    // Assert
    assert_eq!(before.get("appcode"), Some(&json!("OLD")));
    assert_eq!(after.get("appcode"), Some(&json!("NEW")));
    assert_eq!(entries, 2);
    assert_eq!(table.loads(), 2);
}

#[tokio::test]
async fn test_rows_changed_without_reload_are_not_seen() {
    let table = MockSideTable::new(vec![json!({"project_id": "web", "appcode": "OLD"})]);
    let enricher = Enricher::new(table.clone(), "project_id", enrichment_fields());
    enricher.cache().await;

    table.set_rows(vec![json!({"project_id": "web", "appcode": "NEW"})]);
    let out = enricher.enrich(record("a", json!({"project_id": "web"}))).await;

    assert_eq!(out.get("appcode"), Some(&json!("OLD")));
    assert_eq!(table.loads(), 1);
}

#[tokio::test]
async fn test_failed_load_leaves_empty_cache_and_nulls() {
    let table = MockSideTable::failing();
    let enricher = Enricher::new(table.clone(), "project_id", enrichment_fields());

    let out = enricher
        .enrich_all(vec![record("a", json!({"project_id": "web", "cost_impact": 5}))])
        .await;

    assert!(enricher.cache().await.is_empty());
    assert_eq!(out[0].get("appcode"), Some(&Value::Null));
    assert_eq!(out[0].get("lob"), Some(&Value::Null));
    assert_eq!(out[0].get("cost_impact"), Some(&json!(5)), "Record fields should survive");
}

#[tokio::test]
async fn test_no_fields_skips_load() {
    let table = MockSideTable::new(vec![json!({"project_id": "web", "appcode": "APP1"})]);
    let enricher = Enricher::new(table.clone(), "project_id", Vec::new());

    let out = enricher.enrich(record("a", json!({"project_id": "web"}))).await;

    assert_eq!(table.loads(), 0);
    assert!(out.get("appcode").is_none());
}

#[tokio::test]
async fn test_collection_side_table_reads_store() {
    // Arrange
    let store = MockDocumentStore::new();
    store.insert(
        "projects",
        "web",
        fields(json!({"project_id": "web", "appcode": "APP1", "lob": "retail"})),
    );
    let table = CollectionSideTable::new(store, "projects");
    let enricher = Enricher::new(table, "project_id", enrichment_fields());

    // Act
    let out = enricher.enrich(record("a", json!({"project_id": "web"}))).await;

    // Assert
    assert_eq!(out.get("lob"), Some(&json!("retail")));
}

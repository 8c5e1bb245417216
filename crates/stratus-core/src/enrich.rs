//! Side-table enrichment.
//!
//! The [`Enricher`] joins each record against a lookup table (for example
//! project → application code / line of business). The table is loaded on
//! first use, kept in memory, and only replaced by an explicit
//! [`Enricher::reload`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::models::Record;
use crate::traits::{DocumentStore, SideTableSource};

/// Field stamped on every enriched record.
pub const PROCESSED_AT_FIELD: &str = "processed_at";

/// Join key → enrichment fields, immutable once built.
#[derive(Debug, Default, Clone)]
pub struct EnrichmentCache {
    entries: HashMap<String, Map<String, Value>>,
}

impl EnrichmentCache {
    /// Builds the cache from side-table rows.
    ///
    /// Rows without a usable join value are skipped. Each entry keeps only
    /// the configured `fields` that are present in the row.
    pub fn from_rows(rows: Vec<Map<String, Value>>, join_field: &str, fields: &[String]) -> Self {
        let mut entries = HashMap::with_capacity(rows.len());
        for mut row in rows {
            let Some(join_key) = row.get(join_field).and_then(join_value) else {
                continue;
            };
            let entry: Map<String, Value> = fields
                .iter()
                .filter_map(|f| row.remove(f).map(|v| (f.clone(), v)))
                .collect();
            entries.insert(join_key, entry);
        }
        Self { entries }
    }

    pub fn get(&self, join_key: &str) -> Option<&Map<String, Value>> {
        self.entries.get(join_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn join_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Enriches records from a lazily loaded, memoized side table.
///
/// Enrichment never fails per record. A join key missing from the table
/// sets every configured field to `null`, so downstream consumers always see
/// the same schema. A failed table load is logged and leaves an empty cache.
pub struct Enricher<T: SideTableSource> {
    source: T,
    join_field: String,
    fields: Vec<String>,
    cache: RwLock<Option<Arc<EnrichmentCache>>>,
}

impl<T: SideTableSource> Enricher<T> {
    /// Creates an enricher. Nothing is loaded until the first call.
    ///
    /// # Arguments
    ///
    /// * `source` - Side table to load
    /// * `join_field` - Record field matched against the table's join field
    /// * `fields` - Enrichment fields copied onto records
    pub fn new(source: T, join_field: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            source,
            join_field: join_field.into(),
            fields,
            cache: RwLock::new(None),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the cache, loading it on first use.
    pub async fn cache(&self) -> Arc<EnrichmentCache> {
        if let Some(cache) = self.cache.read().await.as_ref() {
            return Arc::clone(cache);
        }

        let mut slot = self.cache.write().await;
        if let Some(cache) = slot.as_ref() {
            return Arc::clone(cache);
        }
        let cache = Arc::new(self.load().await);
        *slot = Some(Arc::clone(&cache));
        cache
    }

    /// Loads the side table again and replaces the cache wholesale.
    ///
    /// Returns the number of entries in the new cache.
    pub async fn reload(&self) -> usize {
        let mut slot = self.cache.write().await;
        let cache = Arc::new(self.load().await);
        let len = cache.len();
        *slot = Some(cache);
        len
    }

    async fn load(&self) -> EnrichmentCache {
        if self.fields.is_empty() {
            debug!("No enrichment fields configured, skipping side table load");
            return EnrichmentCache::default();
        }

        match self.source.load_rows().await {
            Ok(rows) => {
                let cache = EnrichmentCache::from_rows(rows, &self.join_field, &self.fields);
                info!(
                    entries = cache.len(),
                    join_field = self.join_field.as_str(),
                    "Loaded enrichment cache"
                );
                cache
            }
            Err(e) => {
                error!(error = %e, "Failed to load enrichment cache, continuing without enrichment");
                EnrichmentCache::default()
            }
        }
    }

    /// Enriches one record and stamps `processed_at`.
    pub async fn enrich(&self, record: Record) -> Record {
        let cache = self.cache().await;
        self.apply(&cache, record, &now_rfc3339()).0
    }

    /// Enriches a set of records with a shared `processed_at` stamp.
    pub async fn enrich_all(&self, records: Vec<Record>) -> Vec<Record> {
        let cache = self.cache().await;
        let processed_at = now_rfc3339();
        let total = records.len();
        let mut matched = 0;

        let enriched: Vec<Record> = records
            .into_iter()
            .map(|record| {
                let (record, found) = self.apply(&cache, record, &processed_at);
                if found {
                    matched += 1;
                }
                record
            })
            .collect();

        if !self.fields.is_empty() {
            info!("Enriched {} out of {} records", matched, total);
        }
        enriched
    }

    /// Applies a cache to one record. Returns the record and whether its
    /// join key was found.
    fn apply(&self, cache: &EnrichmentCache, mut record: Record, processed_at: &str) -> (Record, bool) {
        let entry = record
            .get(&self.join_field)
            .and_then(join_value)
            .and_then(|key| cache.get(&key));
        let found = entry.is_some();

        for field in &self.fields {
            let value = entry
                .and_then(|e| e.get(field))
                .cloned()
                .unwrap_or(Value::Null);
            record.set(field.clone(), value);
        }
        record.set(PROCESSED_AT_FIELD, Value::String(processed_at.to_string()));

        (record, found)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Side table stored as a collection in a [`DocumentStore`].
#[derive(Clone)]
pub struct CollectionSideTable<S: DocumentStore> {
    store: S,
    collection: String,
}

impl<S: DocumentStore> CollectionSideTable<S> {
    pub fn new(store: S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

impl<S: DocumentStore> SideTableSource for CollectionSideTable<S> {
    async fn load_rows(&self) -> Result<Vec<Map<String, Value>>, AppError> {
        let documents = self.store.fetch_documents(&self.collection).await?;
        Ok(documents.into_iter().map(|(_, fields)| fields).collect())
    }
}

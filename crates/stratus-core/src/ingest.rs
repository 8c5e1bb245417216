//! Ingest service: source → filter → enrich → upsert, across units.
//!
//! # Architecture
//!
//! The [`IngestService`] is generic over three traits:
//! - [`DocumentStore`] - where documents are written
//! - [`RecordSource`] - where records come from, split into units
//! - [`SideTableSource`] - the enrichment lookup table
//!
//! Units are processed concurrently (bounded by
//! [`IngestConfig::concurrency`]). Within a unit, batches are committed in
//! order by the [`UpsertEngine`]. A unit whose fetch fails is recorded as
//! failed and the remaining units carry on.
//!
//! After all units finish the service optionally prunes documents that were
//! not produced by this run, then writes a run metadata document to
//! `{collection}_metadata/latest`. Pruning is skipped whenever any unit
//! failed, since its keys would look stale.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::JobConfig;
use crate::enrich::Enricher;
use crate::filter::RecordFilter;
use crate::models::DocumentKey;
use crate::progress::{IngestEvent, ProgressReporter, SilentReporter};
use crate::stats::{IngestSummary, SaveStats, UnitIngestResult};
use crate::traits::{DocumentStore, RecordSource, SideTableSource};
use crate::upsert::UpsertEngine;

/// Document id of the run metadata document.
pub const METADATA_DOC_ID: &str = "latest";

/// Returns the collection holding run metadata for `collection`.
pub fn metadata_collection(collection: &str) -> String {
    format!("{}_metadata", collection)
}

/// Configuration for an ingest run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Units processed at the same time.
    pub concurrency: usize,
    /// Deployment environment, recorded in run metadata.
    pub environment: String,
    /// Filter applied to every unit's records before enrichment.
    pub filter: RecordFilter,
    /// Write the run metadata document.
    pub write_metadata: bool,
    /// Delete documents not produced by this run.
    pub prune_stale: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            environment: "dev".to_string(),
            filter: RecordFilter::default(),
            write_metadata: true,
            prune_stale: false,
        }
    }
}

impl From<&JobConfig> for IngestConfig {
    fn from(job: &JobConfig) -> Self {
        Self {
            concurrency: job.concurrency,
            environment: job.environment.clone(),
            filter: job.filter.clone(),
            write_metadata: job.run.write_metadata,
            prune_stale: job.run.prune_stale,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a job end to end.
///
/// # Example
///
/// ```ignore
/// let service = IngestService::with_config(engine, source, enricher, IngestConfig::from(&job));
/// let summary = service.run_with_progress(&TracingReporter).await;
/// println!("{} saved, {} errors", summary.totals.saved, summary.totals.errors);
/// ```
pub struct IngestService<S, Src, T>
where
    S: DocumentStore,
    Src: RecordSource,
    T: SideTableSource,
{
    engine: UpsertEngine<S>,
    source: Src,
    enricher: Enricher<T>,
    config: IngestConfig,
}

impl<S, Src, T> IngestService<S, Src, T>
where
    S: DocumentStore,
    Src: RecordSource,
    T: SideTableSource,
{
    /// Creates a service with the default configuration.
    pub fn new(engine: UpsertEngine<S>, source: Src, enricher: Enricher<T>) -> Self {
        Self::with_config(engine, source, enricher, IngestConfig::default())
    }

    pub fn with_config(
        engine: UpsertEngine<S>,
        source: Src,
        enricher: Enricher<T>,
        config: IngestConfig,
    ) -> Self {
        Self {
            engine,
            source,
            enricher,
            config,
        }
    }

    pub fn engine(&self) -> &UpsertEngine<S> {
        &self.engine
    }

    pub fn enricher(&self) -> &Enricher<T> {
        &self.enricher
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingests every unit the source lists.
    pub async fn run(&self) -> IngestSummary {
        self.run_with_progress(&SilentReporter).await
    }

    /// Same as [`run`](Self::run), emitting progress events.
    pub async fn run_with_progress<R: ProgressReporter>(&self, reporter: &R) -> IngestSummary {
        let collection = self.engine.collection();
        let mut summary = IngestSummary::new();

        let units = match self.source.list_units().await {
            Ok(units) => units,
            Err(e) => {
                error!(collection, error = %e, "Failed to list units, nothing written");
                summary.source_error = Some(e.to_string());
                reporter.report(IngestEvent::IngestCompleted { summary: &summary });
                return summary;
            }
        };

        info!(collection, units = units.len(), "Starting ingest");
        reporter.report(IngestEvent::UnitsFound { count: units.len() });

        let totals = Arc::new(Mutex::new(SaveStats::new()));
        let produced: Arc<Mutex<HashSet<DocumentKey>>> = Arc::new(Mutex::new(HashSet::new()));

        let results: Vec<UnitIngestResult> = stream::iter(units)
            .map(|unit| {
                let totals = Arc::clone(&totals);
                let produced = Arc::clone(&produced);
                async move {
                    let result = self.ingest_unit(&unit, &produced, reporter).await;
                    lock(&totals).merge(&result.stats);
                    result
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            summary.add(result);
        }
        summary.totals = *lock(&totals);

        if self.config.prune_stale {
            if summary.failed_count() == 0 {
                let keep = std::mem::take(&mut *lock(&produced));
                match self.engine.prune_stale_with_progress(&keep, reporter).await {
                    Ok(pruned) => summary.pruned = Some(pruned),
                    Err(e) => warn!(collection, error = %e, "Failed to prune stale documents"),
                }
            } else {
                warn!(
                    collection,
                    failed_units = summary.failed_count(),
                    "Skipping prune because some units failed"
                );
            }
        }

        if self.config.write_metadata {
            summary.metadata_written = self.write_metadata(&summary.totals).await;
        }

        reporter.report(IngestEvent::IngestCompleted { summary: &summary });
        summary
    }

    /// Fetches, filters, enriches and writes one unit.
    ///
    /// Keys of the unit's records are added to `produced` before writing.
    async fn ingest_unit<R: ProgressReporter>(
        &self,
        unit: &str,
        produced: &Mutex<HashSet<DocumentKey>>,
        reporter: &R,
    ) -> UnitIngestResult {
        let records = match self.source.fetch_records(unit).await {
            Ok(records) => records,
            Err(e) => {
                let error = e.to_string();
                warn!(unit, error = %e, "Failed to fetch unit");
                reporter.report(IngestEvent::UnitFailed {
                    unit,
                    error: &error,
                });
                return UnitIngestResult::failure(unit.to_string(), error);
            }
        };

        let fetched = records.len();
        let (kept, filtered_out) = self.config.filter.apply(records);
        reporter.report(IngestEvent::UnitFetched {
            unit,
            fetched,
            kept: kept.len(),
        });

        let enriched = self.enricher.enrich_all(kept).await;
        lock(produced).extend(enriched.iter().map(|r| r.key.clone()));

        match self.engine.run_with_progress(enriched, reporter).await {
            Ok(stats) => {
                reporter.report(IngestEvent::UnitCompleted {
                    unit,
                    stats: &stats,
                });
                UnitIngestResult::success(unit.to_string(), fetched, filtered_out, stats)
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(IngestEvent::UnitFailed {
                    unit,
                    error: &error,
                });
                UnitIngestResult::failure(unit.to_string(), error)
                    .with_counts(fetched, filtered_out)
            }
        }
    }

    /// Overwrites `{collection}_metadata/latest`. Returns whether it was written.
    async fn write_metadata(&self, totals: &SaveStats) -> bool {
        let collection = self.engine.collection();
        let target = metadata_collection(collection);
        let run_id = Uuid::new_v4().to_string();

        let mut fields = Map::new();
        fields.insert("collection_name".to_string(), Value::from(collection));
        fields.insert("record_count".to_string(), Value::from(totals.saved));
        fields.insert("error_count".to_string(), Value::from(totals.errors));
        fields.insert(
            "last_updated".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        fields.insert(
            "environment".to_string(),
            Value::from(self.config.environment.as_str()),
        );
        fields.insert(
            "enrichment_fields".to_string(),
            Value::from(self.enricher.fields().to_vec()),
        );
        fields.insert("run_id".to_string(), Value::from(run_id.as_str()));

        let key = match DocumentKey::new(METADATA_DOC_ID) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Invalid metadata document id");
                return false;
            }
        };

        let result = self.engine.write_document(&target, key, fields).await;
        if result.is_success() {
            info!(collection = target.as_str(), run_id = run_id.as_str(), "Wrote run metadata");
            true
        } else {
            warn!(collection = target.as_str(), "Failed to write run metadata");
            false
        }
    }
}

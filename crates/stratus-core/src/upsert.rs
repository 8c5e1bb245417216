//! Upsert engine: partitions records into batches and commits them in order.
//!
//! # Architecture
//!
//! ```text
//! records ──► partition (≤ max_batch_size) ──► BatchCommitter ──► DocumentStore
//!                                                │
//!                                                └─► SaveStats { saved, errors }
//! ```
//!
//! A failed batch never stops the run: its records are counted as errors,
//! its keys are logged, and the next batch is committed. Re-running the same
//! input is safe because documents are keyed by natural key and written with
//! merge semantics.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::commit::{BatchCommitter, FAILED_KEYS_LOG_LIMIT, RetryPolicy, key_preview};
use crate::error::AppError;
use crate::models::{DocumentKey, MAX_BATCH_OPS, Record, WriteBatch};
use crate::partition::partition;
use crate::progress::{IngestEvent, ProgressReporter, SilentReporter};
use crate::stats::{CommitResult, SaveStats};
use crate::traits::DocumentStore;

/// Target collection and batching parameters for an [`UpsertEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertConfig {
    /// Collection the records are written to.
    pub collection: String,
    /// Maximum records per atomic batch.
    pub max_batch_size: usize,
    /// Merge into existing documents instead of replacing them.
    pub merge: bool,
}

impl UpsertConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            max_batch_size: MAX_BATCH_OPS,
            merge: true,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

/// Writes keyed records into one collection in bounded, retried batches.
///
/// # Example
///
/// ```ignore
/// use stratus_core::upsert::{UpsertConfig, UpsertEngine};
///
/// let engine = UpsertEngine::new(repo, "cost_anomalies");
/// let stats = engine.run(records).await?;
/// println!("saved {} ({} errors)", stats.saved, stats.errors);
/// ```
#[derive(Clone)]
pub struct UpsertEngine<S: DocumentStore> {
    committer: BatchCommitter<S>,
    config: UpsertConfig,
}

impl<S: DocumentStore> UpsertEngine<S> {
    /// Creates an engine with the default batch size and retry policy.
    pub fn new(store: S, collection: impl Into<String>) -> Self {
        Self {
            committer: BatchCommitter::new(store),
            config: UpsertConfig::new(collection),
        }
    }

    pub fn with_config(store: S, config: UpsertConfig, policy: RetryPolicy) -> Self {
        Self {
            committer: BatchCommitter::with_policy(store, policy),
            config,
        }
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    pub fn config(&self) -> &UpsertConfig {
        &self.config
    }

    pub fn committer(&self) -> &BatchCommitter<S> {
        &self.committer
    }

    /// Writes all records and returns the run's counts.
    ///
    /// # Errors
    ///
    /// Only a zero `max_batch_size` is an error. Store failures are counted
    /// in the returned [`SaveStats`].
    pub async fn run<I>(&self, records: I) -> Result<SaveStats, AppError>
    where
        I: IntoIterator<Item = Record>,
    {
        self.run_with_progress(records, &SilentReporter).await
    }

    /// Same as [`run`](Self::run), emitting progress events.
    pub async fn run_with_progress<I, R>(
        &self,
        records: I,
        reporter: &R,
    ) -> Result<SaveStats, AppError>
    where
        I: IntoIterator<Item = Record>,
        R: ProgressReporter,
    {
        let collection = self.config.collection.as_str();
        let mut records = records.into_iter().peekable();
        let mut stats = SaveStats::new();

        if records.peek().is_none() {
            debug!(collection, "No records to save");
            return Ok(stats);
        }

        let batches = partition(records, self.config.max_batch_size)?;
        reporter.report(IngestEvent::RunStarted { collection });

        for (batch_index, chunk) in batches.enumerate() {
            let size = chunk.len();
            let batch = WriteBatch::from_records(collection, chunk, self.config.merge);
            let result = self.committer.commit_with_progress(&batch, reporter).await;
            stats.record(&result);

            if result.is_success() {
                reporter.report(IngestEvent::BatchCommitted {
                    collection,
                    batch_index,
                    size,
                    attempts: result.attempts,
                });
            } else {
                error!(
                    collection,
                    batch = batch_index + 1,
                    failed = result.failed,
                    keys = %key_preview(&result.failed_keys, FAILED_KEYS_LOG_LIMIT),
                    "Failed to save batch"
                );
                reporter.report(IngestEvent::BatchFailed {
                    collection,
                    batch_index,
                    size,
                    attempts: result.attempts,
                });
            }
        }

        info!(
            collection,
            saved = stats.saved,
            errors = stats.errors,
            "Upsert finished"
        );
        reporter.report(IngestEvent::RunCompleted {
            collection,
            stats: &stats,
        });

        Ok(stats)
    }

    /// Deletes documents whose keys are not in `keep`.
    ///
    /// Deletes go through the committer in batches like any other write.
    /// In the returned stats, `saved` counts deleted documents and `errors`
    /// counts documents that could not be deleted.
    pub async fn prune_stale(&self, keep: &HashSet<DocumentKey>) -> Result<SaveStats, AppError> {
        self.prune_stale_with_progress(keep, &SilentReporter).await
    }

    /// Same as [`prune_stale`](Self::prune_stale), emitting progress events.
    pub async fn prune_stale_with_progress<R: ProgressReporter>(
        &self,
        keep: &HashSet<DocumentKey>,
        reporter: &R,
    ) -> Result<SaveStats, AppError> {
        let collection = self.config.collection.as_str();
        let existing = self.committer.store().list_keys(collection).await?;

        let mut stale = Vec::new();
        for id in existing.iter() {
            match DocumentKey::from_stored(id.as_str()) {
                Ok(key) if !keep.contains(&key) => stale.push(key),
                Ok(_) => {}
                Err(e) => warn!(collection, error = %e, "Skipping unaddressable stored id"),
            }
        }

        let mut stats = SaveStats::new();
        if stale.is_empty() {
            debug!(collection, existing = existing.len(), "No stale documents");
            return Ok(stats);
        }

        info!(
            collection,
            stale = stale.len(),
            "Deleting documents not seen in this run"
        );

        for chunk in partition(stale, self.config.max_batch_size)? {
            let batch = WriteBatch::deletes(collection, chunk);
            let result = self.committer.commit_with_progress(&batch, reporter).await;
            if !result.is_success() {
                error!(
                    collection,
                    failed = result.failed,
                    keys = %key_preview(&result.failed_keys, FAILED_KEYS_LOG_LIMIT),
                    "Failed to delete stale documents"
                );
            }
            stats.record(&result);
        }

        reporter.report(IngestEvent::PruneCompleted {
            collection,
            stats: &stats,
        });
        Ok(stats)
    }

    /// Replaces a single document, with the same retry policy as batches.
    pub async fn write_document(
        &self,
        collection: &str,
        key: DocumentKey,
        fields: Map<String, Value>,
    ) -> CommitResult {
        let mut batch = WriteBatch::new(collection);
        batch.set(key, fields, false);
        self.committer.commit(&batch).await
    }
}

//! Progress reporting for upsert and ingest runs.
//!
//! Services emit [`IngestEvent`]s through a [`ProgressReporter`] so the CLI,
//! tests and any future frontend can observe a run without the services
//! knowing how events are displayed.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::stats::{IngestSummary, SaveStats};

// =============================================================================
// Events
// =============================================================================

/// Events emitted while ingesting and writing records.
#[derive(Debug, Clone)]
pub enum IngestEvent<'a> {
    /// The engine started writing into a collection.
    RunStarted { collection: &'a str },
    /// A batch was written.
    BatchCommitted {
        collection: &'a str,
        batch_index: usize,
        size: usize,
        attempts: u32,
    },
    /// A transient failure; the committer sleeps for `delay` before retrying.
    RetryScheduled {
        collection: &'a str,
        attempt: u32,
        delay: Duration,
        error: &'a str,
    },
    /// A batch could not be written; its records count as errors.
    BatchFailed {
        collection: &'a str,
        batch_index: usize,
        size: usize,
        attempts: u32,
    },
    /// The engine finished a collection.
    RunCompleted {
        collection: &'a str,
        stats: &'a SaveStats,
    },
    /// The source listed its units.
    UnitsFound { count: usize },
    /// A unit's records were fetched and filtered.
    UnitFetched {
        unit: &'a str,
        fetched: usize,
        kept: usize,
    },
    /// A unit could not be fetched.
    UnitFailed { unit: &'a str, error: &'a str },
    /// A unit's records were written.
    UnitCompleted {
        unit: &'a str,
        stats: &'a SaveStats,
    },
    /// Stale documents were deleted.
    PruneCompleted {
        collection: &'a str,
        stats: &'a SaveStats,
    },
    /// The whole ingestion run finished.
    IngestCompleted { summary: &'a IngestSummary },
}

// =============================================================================
// Reporter Trait
// =============================================================================

/// Trait for reporting progress events.
pub trait ProgressReporter: Send + Sync {
    /// Called when an event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: IngestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Tracing-based reporter for CLI logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: IngestEvent<'_>) {
        match event {
            IngestEvent::RunStarted { collection } => {
                debug!(collection, "Writing records");
            }
            IngestEvent::BatchCommitted {
                collection,
                batch_index,
                size,
                attempts,
            } => {
                info!(
                    collection,
                    batch = batch_index + 1,
                    size,
                    attempts,
                    "Committed batch"
                );
            }
            IngestEvent::RetryScheduled {
                collection,
                attempt,
                delay,
                error,
            } => {
                warn!(
                    collection,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error,
                    "Transient store error, retrying"
                );
            }
            IngestEvent::BatchFailed {
                collection,
                batch_index,
                size,
                attempts,
            } => {
                warn!(
                    collection,
                    batch = batch_index + 1,
                    size,
                    attempts,
                    "Batch failed"
                );
            }
            IngestEvent::RunCompleted { collection, stats } => {
                info!(
                    collection,
                    saved = stats.saved,
                    errors = stats.errors,
                    "Saved {} records",
                    stats.saved
                );
            }
            IngestEvent::UnitsFound { count } => {
                info!("Found {} units to ingest", count);
            }
            IngestEvent::UnitFetched {
                unit,
                fetched,
                kept,
            } => {
                info!(unit, fetched, kept, "Fetched records");
            }
            IngestEvent::UnitFailed { unit, error } => {
                warn!(unit, error, "Unit failed, continuing with the rest");
            }
            IngestEvent::UnitCompleted { unit, stats } => {
                info!(
                    unit,
                    saved = stats.saved,
                    errors = stats.errors,
                    "Unit complete"
                );
            }
            IngestEvent::PruneCompleted { collection, stats } => {
                info!(
                    collection,
                    deleted = stats.saved,
                    errors = stats.errors,
                    "Pruned stale documents"
                );
            }
            IngestEvent::IngestCompleted { summary } => {
                info!(
                    units = summary.total_units(),
                    failed_units = summary.failed_count(),
                    saved = summary.totals.saved,
                    errors = summary.totals.errors,
                    "Ingestion complete"
                );
            }
        }
    }
}

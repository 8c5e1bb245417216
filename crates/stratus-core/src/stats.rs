//! Write statistics and run summaries.
//!
//! Pure bookkeeping types shared by the committer, the upsert engine and the
//! ingest service. Nothing in here performs I/O.

use crate::models::DocumentKey;

/// Outcome of committing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResult {
    /// Records written by the batch
    pub succeeded: usize,
    /// Records in a batch that could not be written
    pub failed: usize,
    /// Keys of the failed records, in batch order
    pub failed_keys: Vec<DocumentKey>,
    /// Number of store calls made for this batch
    pub attempts: u32,
}

impl CommitResult {
    /// A fully written batch.
    pub fn success(size: usize, attempts: u32) -> Self {
        Self {
            succeeded: size,
            failed: 0,
            failed_keys: Vec::new(),
            attempts,
        }
    }

    /// A batch that failed as a whole.
    pub fn failure(keys: Vec<DocumentKey>, attempts: u32) -> Self {
        Self {
            succeeded: 0,
            failed: keys.len(),
            failed_keys: keys,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Run-level write counts.
///
/// For any run, `saved + errors` equals the number of records handed to the
/// engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub saved: usize,
    pub errors: usize,
}

impl SaveStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a batch outcome to the counts.
    pub fn record(&mut self, result: &CommitResult) {
        self.saved += result.succeeded;
        self.errors += result.failed;
    }

    /// Adds another run's counts.
    pub fn merge(&mut self, other: &SaveStats) {
        self.saved += other.saved;
        self.errors += other.errors;
    }

    /// Total number of records accounted for.
    pub fn total(&self) -> usize {
        self.saved + self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Result of ingesting one unit of work.
#[derive(Debug, Clone)]
pub struct UnitIngestResult {
    /// Unit name (project, file, account)
    pub unit: String,
    /// Records the source produced for the unit
    pub fetched: usize,
    /// Records dropped by the job's filter
    pub filtered_out: usize,
    /// Write counts for the unit
    pub stats: SaveStats,
    /// Fetch error, if the source failed for this unit
    pub error: Option<String>,
}

impl UnitIngestResult {
    /// Creates a result for a unit whose records reached the engine.
    pub fn success(unit: String, fetched: usize, filtered_out: usize, stats: SaveStats) -> Self {
        Self {
            unit,
            fetched,
            filtered_out,
            stats,
            error: None,
        }
    }

    /// Creates a result for a unit whose fetch failed.
    pub fn failure(unit: String, error: String) -> Self {
        Self {
            unit,
            fetched: 0,
            filtered_out: 0,
            stats: SaveStats::default(),
            error: Some(error),
        }
    }

    /// Keeps the counts gathered before a unit failed after fetching.
    pub fn with_counts(mut self, fetched: usize, filtered_out: usize) -> Self {
        self.fetched = fetched;
        self.filtered_out = filtered_out;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a complete ingestion run across units.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    /// Per-unit results, in completion order
    pub results: Vec<UnitIngestResult>,
    /// Totals across all units
    pub totals: SaveStats,
    /// Error listing units, when the source could not enumerate them
    pub source_error: Option<String>,
    /// Whether the run metadata document was written
    pub metadata_written: bool,
    /// Delete counts from stale-document pruning, if it ran
    pub pruned: Option<SaveStats>,
}

impl IngestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: UnitIngestResult) {
        self.results.push(result);
    }

    pub fn total_units(&self) -> usize {
        self.results.len()
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Records fetched across all units.
    pub fn total_fetched(&self) -> usize {
        self.results.iter().map(|r| r.fetched).sum()
    }

    /// True when every unit fetched and every record was written.
    pub fn is_clean(&self) -> bool {
        self.source_error.is_none() && self.failed_count() == 0 && !self.totals.has_errors()
    }
}

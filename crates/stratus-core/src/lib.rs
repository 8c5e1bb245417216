//! Stratus Core - Domain types, the batched upsert engine, and ingestion.
//!
//! This crate provides the core functionality for Stratus, including:
//!
//! - **Domain models**: [`DocumentKey`], [`Record`], [`KeySpec`], [`WriteBatch`]
//! - **Upsert engine**: [`UpsertEngine`] partitions records into bounded
//!   batches and commits each atomically through a [`BatchCommitter`]
//! - **Retry**: [`RetryPolicy`] with exponential backoff and jitter, driven by
//!   the [`classify`] fault table
//! - **Enrichment**: [`Enricher`] joins records against a memoized side table
//! - **Services**: [`IngestService`] runs a job across units concurrently
//! - **Traits**: [`DocumentStore`], [`RecordSource`], [`SideTableSource`] for
//!   dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! Business logic never touches a database or file directly. The PostgreSQL
//! store lives in `stratus-db`; the CLI wires it together in `stratus-cli`.
//!
//! # Example
//!
//! ```ignore
//! use stratus_core::{KeySpec, TracingReporter, UpsertEngine};
//!
//! let key = KeySpec::new(["anomaly_id"]);
//! let records = rows.into_iter().map(|row| key.record(row)).collect::<Result<Vec<_>, _>>()?;
//!
//! let engine = UpsertEngine::new(repo, "cost_anomalies");
//! let stats = engine.run_with_progress(records, &TracingReporter).await?;
//! ```

pub mod commit;
pub mod config;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod partition;
pub mod progress;
pub mod source;
pub mod stats;
pub mod traits;
pub mod upsert;

// Configuration
pub use config::{
    DbConfig, EnrichmentConfig, JobConfig, RunOptions, SourceConfig, StoreConfig,
    default_config_path, load_job_config,
};

// Error handling
pub use error::{AppError, FaultClass, StoreErrorDetails, StoreErrorKind, classify};

// Domain models
pub use models::{DocumentKey, KeySpec, MAX_BATCH_OPS, MAX_KEY_BYTES, Record, WriteBatch, WriteOp};

// Batching, commit and statistics
pub use commit::{BatchCommitter, RetryPolicy};
pub use partition::{Batches, batch_count, partition};
pub use stats::{CommitResult, IngestSummary, SaveStats, UnitIngestResult};

// Progress reporting
pub use progress::{IngestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{DocumentStore, RecordSource, SideTableSource};

// Services (generic over trait implementations)
pub use enrich::{CollectionSideTable, EnrichmentCache, Enricher};
pub use filter::RecordFilter;
pub use ingest::{IngestConfig, IngestService};
pub use source::JsonLinesSource;
pub use upsert::{UpsertConfig, UpsertEngine};

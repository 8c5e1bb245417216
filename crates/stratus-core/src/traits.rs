//! Trait definitions for external dependencies.
//!
//! The engine and ingest pipeline only see these traits, so stores, sources
//! and side tables can be swapped for in-memory fakes in tests.
//!
//! # Example
//!
//! ```
//! use stratus_core::traits::DocumentStore;
//! use stratus_core::{AppError, DocumentKey, WriteBatch};
//!
//! async fn touch<S: DocumentStore>(store: &S, key: DocumentKey) -> Result<(), AppError> {
//!     let mut batch = WriteBatch::new("heartbeats");
//!     batch.set(key, serde_json::Map::new(), true);
//!     store.commit(&batch).await
//! }
//! ```

use std::future::Future;

use serde_json::{Map, Value};

use crate::models::{Record, WriteBatch};
use crate::AppError;

/// A document store accepting atomic batch writes.
///
/// Implementations must be safe to share between concurrent workers; each
/// call is an independent request.
pub trait DocumentStore: Send + Sync + Clone {
    /// Applies every operation in `batch` atomically.
    ///
    /// Either all operations take effect or none do. Failures are reported
    /// as `AppError::Store` with a classified kind.
    fn commit(&self, batch: &WriteBatch) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Lists the document keys in a collection.
    fn list_keys(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Fetches every document in a collection as `(key, fields)` pairs.
    fn fetch_documents(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<(String, Map<String, Value>)>, AppError>> + Send;

    /// Checks connectivity.
    fn health_check(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Producer of keyed records.
///
/// Work is split into independent units (projects, billing accounts, input
/// files) that can be fetched concurrently.
pub trait RecordSource: Send + Sync + Clone {
    /// Lists the units to ingest.
    fn list_units(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Fetches all records for one unit.
    ///
    /// # Arguments
    ///
    /// * `unit` - A unit name returned by [`list_units`](Self::list_units)
    fn fetch_records(
        &self,
        unit: &str,
    ) -> impl Future<Output = Result<Vec<Record>, AppError>> + Send;
}

/// Source of side-table rows used for enrichment.
pub trait SideTableSource: Send + Sync {
    /// Loads every row of the side table.
    fn load_rows(&self) -> impl Future<Output = Result<Vec<Map<String, Value>>, AppError>> + Send;
}

use thiserror::Error;

/// Store failure categories.
///
/// Modeled on the status codes document stores report for batch writes.
/// Backends map their native errors onto these kinds so that retry decisions
/// stay independent of any particular driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Quota or resource limit hit (too many connections, rate limited)
    ResourceExhausted,
    /// The call did not complete before its deadline
    DeadlineExceeded,
    /// The store could not be reached
    Unavailable,
    /// Write conflict or aborted transaction
    Aborted,
    /// Malformed payload or constraint violation
    InvalidArgument,
    /// Caller is not allowed to perform the write
    PermissionDenied,
    /// Target database or collection does not exist
    NotFound,
    /// Internal store error
    Internal,
}

impl StoreErrorKind {
    /// Maps the kind onto the retry decision table.
    pub fn fault_class(self) -> FaultClass {
        match self {
            StoreErrorKind::ResourceExhausted
            | StoreErrorKind::DeadlineExceeded
            | StoreErrorKind::Unavailable
            | StoreErrorKind::Aborted => FaultClass::Transient,
            StoreErrorKind::InvalidArgument
            | StoreErrorKind::PermissionDenied
            | StoreErrorKind::NotFound
            | StoreErrorKind::Internal => FaultClass::Permanent,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            StoreErrorKind::ResourceExhausted => "resource exhausted",
            StoreErrorKind::DeadlineExceeded => "deadline exceeded",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Aborted => "aborted",
            StoreErrorKind::InvalidArgument => "invalid argument",
            StoreErrorKind::PermissionDenied => "permission denied",
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Internal => "internal",
        }
    }
}

/// Structured error details from a document store.
#[derive(Debug, Clone)]
pub struct StoreErrorDetails {
    /// The failure category
    pub kind: StoreErrorKind,
    /// Message reported by the backend
    pub message: String,
}

impl StoreErrorDetails {
    /// Create a new StoreErrorDetails
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StoreErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

/// Whether a failed store call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Expected to resolve on retry (quota, timeout, unavailability, conflict)
    Transient,
    /// Will not resolve on retry (bad data, permission denied)
    Permanent,
}

/// Application-wide error types.
///
/// Built with `thiserror`; serde errors convert automatically through
/// `#[from]`. Store backends report failures as [`AppError::Store`] with a
/// [`StoreErrorKind`], which [`classify`] turns into a retry decision.
///
/// # Examples
///
/// ```
/// use stratus_core::error::{AppError, FaultClass, StoreErrorDetails, StoreErrorKind, classify};
///
/// let err = AppError::Store(StoreErrorDetails::new(
///     StoreErrorKind::ResourceExhausted,
///     "quota exceeded",
/// ));
/// assert_eq!(classify(&err), FaultClass::Transient);
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// A document store call failed.
    ///
    /// Carries the classified kind reported by the store backend.
    #[error("Store error: {0}")]
    Store(StoreErrorDetails),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A record source failed to produce records.
    ///
    /// Raised by source collaborators (file readers, API clients). The ingest
    /// service isolates these per unit.
    #[error("Source error: {0}")]
    SourceError(String),

    /// A record lacks a field required to build its natural key.
    #[error("Missing key field: {0}")]
    MissingKey(String),

    /// A natural key is empty after sanitization.
    #[error("Invalid document key: {0:?}")]
    InvalidKey(String),

    /// Batch capacity must be at least one.
    ///
    /// This is a programming error and is never retried.
    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    /// Configuration file or environment error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Shorthand for building a store error.
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        AppError::Store(StoreErrorDetails::new(kind, message))
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Store(details) => match details.kind {
                StoreErrorKind::Unavailable => format!(
                    "Cannot reach the document store: {}\n   Is PostgreSQL running? Check DATABASE_URL.",
                    details.message
                ),
                StoreErrorKind::PermissionDenied => format!(
                    "The store rejected the write: {}\n   Check the database role's privileges.",
                    details.message
                ),
                StoreErrorKind::NotFound => format!(
                    "Store target not found: {}\n   Try: stratus migrate",
                    details.message
                ),
                _ => format!("Store error: {}", details),
            },
            AppError::ConfigError(msg) => {
                format!("Configuration error: {}\n   Check your job file.", msg)
            }
            AppError::SourceError(msg) => {
                format!("Could not read records: {}", msg)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_core::error::{AppError, StoreErrorKind};
    ///
    /// assert!(AppError::store(StoreErrorKind::Aborted, "conflict").is_retryable());
    /// assert!(!AppError::store(StoreErrorKind::PermissionDenied, "denied").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        classify(self) == FaultClass::Transient
    }
}

/// Retry decision table for store failures.
///
/// Only store errors of a transient kind are retried. Everything else
/// (serialization, invalid keys, permanent store kinds) fails the batch
/// on the first attempt.
pub fn classify(err: &AppError) -> FaultClass {
    match err {
        AppError::Store(details) => details.kind.fault_class(),
        AppError::SerializationError(_)
        | AppError::SourceError(_)
        | AppError::MissingKey(_)
        | AppError::InvalidKey(_)
        | AppError::InvalidBatchSize(_)
        | AppError::ConfigError(_)
        | AppError::Generic(_) => FaultClass::Permanent,
    }
}

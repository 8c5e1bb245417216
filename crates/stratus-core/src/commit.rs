//! Atomic batch commits with bounded retry.
//!
//! [`BatchCommitter`] writes one [`WriteBatch`] as a single store call. Failed
//! calls go through [`classify`]: transient faults are retried with
//! exponential backoff plus jitter, permanent faults fail the batch at once.
//! Resending a batch is safe because every op is keyed, so a retry after a
//! partially applied attempt converges to the same documents.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{FaultClass, classify};
use crate::models::{DocumentKey, WriteBatch};
use crate::progress::{IngestEvent, ProgressReporter, SilentReporter};
use crate::stats::CommitResult;
use crate::traits::DocumentStore;

/// Number of failed keys included in log lines.
pub const FAILED_KEYS_LOG_LIMIT: usize = 10;

// =============================================================================
// Retry Policy
// =============================================================================

/// Backoff policy for transient store faults.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total commit attempts per batch, including the first.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
    /// Cap on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Delay after the failed attempt `attempt` (0-based).
    ///
    /// `base_delay * 2^attempt + jitter * max_jitter`, capped at `max_delay`.
    /// `jitter` is a fraction in `[0, 1)`.
    ///
    /// - Attempt 0: 1s + jitter
    /// - Attempt 1: 2s + jitter
    /// - Attempt 2: 4s + jitter
    pub fn backoff_for_attempt(&self, attempt: u32, jitter: f64) -> Duration {
        let exponential = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        let jitter = self.max_jitter.mul_f64(jitter.clamp(0.0, 1.0));
        std::cmp::min(exponential.saturating_add(jitter), self.max_delay)
    }
}

/// Formats at most `limit` keys for a log line.
///
/// ```
/// use stratus_core::commit::key_preview;
/// use stratus_core::DocumentKey;
///
/// let keys: Vec<DocumentKey> = ["a", "b", "c"].iter().map(|k| DocumentKey::new(k).unwrap()).collect();
/// assert_eq!(key_preview(&keys, 2), "a, b (+1 more)");
/// ```
pub fn key_preview(keys: &[DocumentKey], limit: usize) -> String {
    let shown: Vec<&str> = keys.iter().take(limit).map(DocumentKey::as_str).collect();
    let mut preview = shown.join(", ");
    if keys.len() > limit {
        preview.push_str(&format!(" (+{} more)", keys.len() - limit));
    }
    preview
}

// =============================================================================
// Batch Committer
// =============================================================================

/// Commits batches against a [`DocumentStore`] under a [`RetryPolicy`].
#[derive(Clone)]
pub struct BatchCommitter<S: DocumentStore> {
    store: S,
    policy: RetryPolicy,
}

impl<S: DocumentStore> BatchCommitter<S> {
    /// Creates a committer with the default policy (3 attempts).
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Commits one batch and reports the outcome.
    ///
    /// Never returns an error: every failure is folded into the
    /// [`CommitResult`].
    pub async fn commit(&self, batch: &WriteBatch) -> CommitResult {
        self.commit_with_progress(batch, &SilentReporter).await
    }

    /// Same as [`commit`](Self::commit), emitting a
    /// [`IngestEvent::RetryScheduled`] before each backoff sleep.
    pub async fn commit_with_progress<R: ProgressReporter>(
        &self,
        batch: &WriteBatch,
        reporter: &R,
    ) -> CommitResult {
        if batch.is_empty() {
            return CommitResult::success(0, 0);
        }

        let collection = batch.collection();
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt: u32 = 0;

        loop {
            let err = match self.store.commit(batch).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(
                            collection,
                            attempts = attempt + 1,
                            "Batch committed after retry"
                        );
                    }
                    return CommitResult::success(batch.len(), attempt + 1);
                }
                Err(e) => e,
            };

            let attempts = attempt + 1;
            let class = classify(&err);

            if class == FaultClass::Transient && attempts < max_attempts {
                let jitter: f64 = rand::rng().random();
                let delay = self.policy.backoff_for_attempt(attempt, jitter);
                let error = err.to_string();
                debug!(
                    collection,
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient store error"
                );
                reporter.report(IngestEvent::RetryScheduled {
                    collection,
                    attempt: attempts,
                    delay,
                    error: &error,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            warn!(
                collection,
                attempts,
                size = batch.len(),
                transient = class == FaultClass::Transient,
                error = %err,
                "Giving up on batch"
            );
            return CommitResult::failure(batch.keys(), attempts);
        }
    }
}

//! Lazy fixed-capacity batching.

use std::iter::FusedIterator;

use crate::error::AppError;
use crate::models::MAX_BATCH_OPS;

/// Iterator over consecutive chunks of at most `max_batch_size` items.
///
/// Created by [`partition`]. Chunks are produced on demand, so an unbounded
/// input is never fully buffered.
#[derive(Debug, Clone)]
pub struct Batches<I: Iterator> {
    inner: I,
    max_batch_size: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.max_batch_size.min(MAX_BATCH_OPS));
        batch.extend(self.inner.by_ref().take(self.max_batch_size));
        if batch.is_empty() { None } else { Some(batch) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        (
            lower.div_ceil(self.max_batch_size),
            upper.map(|u| u.div_ceil(self.max_batch_size)),
        )
    }
}

impl<I: FusedIterator> FusedIterator for Batches<I> {}

/// Splits `items` into ordered batches of at most `max_batch_size`.
///
/// Concatenating the batches reproduces the input exactly.
///
/// # Errors
///
/// Returns `AppError::InvalidBatchSize` if `max_batch_size` is zero.
///
/// # Examples
///
/// ```
/// use stratus_core::partition::partition;
///
/// let sizes: Vec<usize> = partition(0..1250, 500).unwrap().map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![500, 500, 250]);
/// ```
pub fn partition<I>(items: I, max_batch_size: usize) -> Result<Batches<I::IntoIter>, AppError>
where
    I: IntoIterator,
{
    if max_batch_size == 0 {
        return Err(AppError::InvalidBatchSize(max_batch_size));
    }
    Ok(Batches {
        inner: items.into_iter(),
        max_batch_size,
    })
}

/// Number of batches `len` items split into.
pub fn batch_count(len: usize, max_batch_size: usize) -> usize {
    if max_batch_size == 0 {
        return 0;
    }
    len.div_ceil(max_batch_size)
}

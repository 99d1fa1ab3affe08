//! Embedded engine error types.

use std::fmt;

/// Errors from the raw KV layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// Opening the storage backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The namespace or key is invalid.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for raw KV operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from entity operations on the embedded engine.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddedError {
    /// No entity is stored under the requested key.
    #[error("embedded: no such entity")]
    NoSuchEntity,

    /// The iterator has no more results.
    #[error("embedded: query has no more results")]
    Done,

    /// One or more elements of a batch operation failed.
    #[error(transparent)]
    Multi(MultiError),

    /// The key is malformed for the requested operation.
    #[error("embedded: invalid key: {0}")]
    InvalidKey(String),

    /// The query could not be executed.
    #[error("embedded: invalid query: {0}")]
    InvalidQuery(String),

    /// The value cannot be stored as an entity.
    #[error("embedded: invalid entity: {0}")]
    InvalidEntity(String),

    /// Batch arguments have different lengths.
    #[error("embedded: {keys} keys but {values} values")]
    LengthMismatch {
        /// Number of keys supplied.
        keys: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// The context deadline elapsed before the operation finished.
    #[error("embedded: deadline exceeded")]
    DeadlineExceeded,

    /// Encoding or decoding an entity failed.
    #[error("embedded: serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying KV store failed.
    #[error("embedded: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for embedded engine operations.
pub type EmbeddedResult<T> = Result<T, EmbeddedError>;

/// Per-element outcome of a batch operation.
///
/// Index `i` holds the error for input element `i`, or `None` if that
/// element succeeded.
#[derive(Debug)]
pub struct MultiError(pub Vec<Option<EmbeddedError>>);

impl MultiError {
    /// Number of failed elements.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.0.iter().filter(|e| e.is_some()).count()
    }

    /// Iterate over `(index, error)` pairs of the failed elements.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &EmbeddedError)> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors().next() {
            Some((i, first)) => write!(
                f,
                "embedded: {} of {} batch elements failed (first at {i}: {first})",
                self.failed(),
                self.0.len()
            ),
            None => write!(f, "embedded: batch of {} succeeded", self.0.len()),
        }
    }
}

impl std::error::Error for MultiError {}

/// Collapse per-element results into a batch result.
///
/// Returns the values when every element succeeded, otherwise a
/// [`EmbeddedError::Multi`] carrying one slot per input.
pub(crate) fn collect_batch<T>(results: Vec<EmbeddedResult<T>>) -> EmbeddedResult<Vec<T>> {
    if results.iter().all(Result::is_ok) {
        return Ok(results.into_iter().filter_map(Result::ok).collect());
    }
    Err(EmbeddedError::Multi(MultiError(
        results.into_iter().map(Result::err).collect(),
    )))
}

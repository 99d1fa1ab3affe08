//! Remote store error types.

use std::fmt;

/// Errors from the remote entity store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// No entity is stored under the requested key.
    #[error("remote: no such entity")]
    NoSuchEntity,

    /// The iterator has no more results.
    #[error("remote: no more items in iterator")]
    Done,

    /// One or more elements of a batch operation failed.
    #[error(transparent)]
    Multi(MultiError),

    /// The key is malformed for the requested operation.
    #[error("remote: invalid key: {0}")]
    InvalidKey(String),

    /// The query could not be translated or executed.
    #[error("remote: invalid query: {0}")]
    InvalidQuery(String),

    /// The value cannot be stored as an entity.
    #[error("remote: invalid entity: {0}")]
    InvalidEntity(String),

    /// Batch arguments have different lengths.
    #[error("remote: {keys} keys but {values} values")]
    LengthMismatch {
        /// Number of keys supplied.
        keys: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// The database could not be reached or selected.
    #[error("remote: connection: {0}")]
    Connection(String),

    /// The client was closed.
    #[error("remote: client is closed")]
    Closed,

    /// Encoding or decoding an entity failed.
    #[error("remote: serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database connection or statement failed.
    #[error("remote: {0}")]
    Db(#[from] surrealdb::Error),
}

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Per-element outcome of a batch operation, index-aligned with the input.
#[derive(Debug)]
pub struct MultiError(pub Vec<Option<RemoteError>>);

impl MultiError {
    /// Whether any element failed.
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.0.iter().any(Option::is_some)
    }

    /// The error of element `index`, if it failed.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RemoteError> {
        self.0.get(index).and_then(Option::as_ref)
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self
            .0
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| format!("[{i}] {e}")))
            .collect();
        write!(f, "remote: batch errors: {}", failed.join("; "))
    }
}

impl std::error::Error for MultiError {}

pub(crate) fn batch<T>(results: Vec<RemoteResult<T>>) -> RemoteResult<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut errors = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(v) => {
                values.push(v);
                errors.push(None);
            },
            Err(e) => errors.push(Some(e)),
        }
    }
    if values.len() == errors.len() {
        Ok(values)
    } else {
        Err(RemoteError::Multi(MultiError(errors)))
    }
}

//! Facade error types.

use tern_config::{Backend, ConfigError};
use tern_embedded::EmbeddedError;
use tern_remote::RemoteError;

/// Errors from facade operations.
///
/// Backend errors pass through unchanged, except each backend's own
/// exhaustion sentinel, which becomes [`DatastoreError::Done`].
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// The iterator has no more results.
    #[error("datastore: query has no more results")]
    Done,

    /// A key made by the other backend was handed to this client.
    #[error("datastore: key belongs to another backend, expected a {expected} key")]
    ForeignKey {
        /// Backend of the client that received the key.
        expected: Backend,
    },

    /// Error reported by the remote backend.
    #[error(transparent)]
    Remote(RemoteError),

    /// Error reported by the embedded backend.
    #[error(transparent)]
    Embedded(EmbeddedError),

    /// The configuration could not build a client.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for facade operations.
pub type DatastoreResult<T> = Result<T, DatastoreError>;

impl From<RemoteError> for DatastoreError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Done => Self::Done,
            other => Self::Remote(other),
        }
    }
}

impl From<EmbeddedError> for DatastoreError {
    fn from(e: EmbeddedError) -> Self {
        match e {
            EmbeddedError::Done => Self::Done,
            other => Self::Embedded(other),
        }
    }
}

impl DatastoreError {
    /// Whether this is the iteration-exhausted sentinel.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether the backend reported a missing entity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::NoSuchEntity) | Self::Embedded(EmbeddedError::NoSuchEntity)
        )
    }

    /// Failed slots of a batch error, by input index. Empty for any other
    /// error.
    #[must_use]
    pub fn multi_errors(&self) -> Vec<(usize, &(dyn std::error::Error + 'static))> {
        match self {
            Self::Remote(RemoteError::Multi(multi)) => multi
                .0
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| {
                    slot.as_ref()
                        .map(|e| (i, e as &(dyn std::error::Error + 'static)))
                })
                .collect(),
            Self::Embedded(EmbeddedError::Multi(multi)) => multi
                .errors()
                .map(|(i, e)| (i, e as &(dyn std::error::Error + 'static)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

//! Backend-neutral result iteration.

use serde::de::DeserializeOwned;

use crate::error::{DatastoreError, DatastoreResult};
use crate::key::Key;

#[derive(Debug)]
enum NativeIter {
    Remote(tern_remote::Iter),
    Embedded(tern_embedded::Iter),
    // The query could not be handed to the backend; reported on every call.
    Rejected(tern_config::Backend),
}

/// Iterator over the results of one query run.
///
/// Reports [`DatastoreError::Done`] once no results remain, and on every
/// call after that.
#[derive(Debug)]
pub struct Iter {
    native: NativeIter,
}

impl Iter {
    pub(crate) fn remote(it: tern_remote::Iter) -> Self {
        Self {
            native: NativeIter::Remote(it),
        }
    }

    pub(crate) fn embedded(it: tern_embedded::Iter) -> Self {
        Self {
            native: NativeIter::Embedded(it),
        }
    }

    pub(crate) fn rejected(expected: tern_config::Backend) -> Self {
        Self {
            native: NativeIter::Rejected(expected),
        }
    }

    /// Decode the next result into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Done`] when exhausted; any other error is
    /// the backend's own, including a malformed query.
    pub async fn next<T: DeserializeOwned>(&mut self) -> DatastoreResult<(Key, T)> {
        match &mut self.native {
            NativeIter::Remote(it) => {
                let (key, value) = it.next::<T>().await?;
                Ok((Key::from_remote(key), value))
            },
            NativeIter::Embedded(it) => {
                let (key, value) = it.next::<T>().await?;
                Ok((Key::from_embedded(key), value))
            },
            NativeIter::Rejected(expected) => Err(DatastoreError::ForeignKey {
                expected: *expected,
            }),
        }
    }

    /// Advance and return only the key of the next result.
    ///
    /// # Errors
    ///
    /// Same as [`Iter::next`].
    pub async fn next_key(&mut self) -> DatastoreResult<Key> {
        match &mut self.native {
            NativeIter::Remote(it) => Ok(Key::from_remote(it.next_key().await?)),
            NativeIter::Embedded(it) => Ok(Key::from_embedded(it.next_key().await?)),
            NativeIter::Rejected(expected) => Err(DatastoreError::ForeignKey {
                expected: *expected,
            }),
        }
    }
}

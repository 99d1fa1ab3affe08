//! Backend-neutral entity keys.

use std::fmt;

use tern_config::Backend;

use crate::error::{DatastoreError, DatastoreResult};

/// A key in one backend's native form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum NativeKey {
    Remote(tern_remote::Key),
    Embedded(tern_embedded::Key),
}

/// Identity and location of one entity.
///
/// Keys come from a [`Client`](crate::Client) and only work with clients of
/// the same backend. Complete keys carry either a numeric id or a name;
/// incomplete keys carry neither and are completed by `put` or
/// `allocate_ids`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    native: NativeKey,
}

impl Key {
    pub(crate) fn from_remote(key: tern_remote::Key) -> Self {
        Self {
            native: NativeKey::Remote(key),
        }
    }

    pub(crate) fn from_embedded(key: tern_embedded::Key) -> Self {
        Self {
            native: NativeKey::Embedded(key),
        }
    }

    pub(crate) fn native(&self) -> &NativeKey {
        &self.native
    }

    pub(crate) fn remote(&self) -> DatastoreResult<&tern_remote::Key> {
        match &self.native {
            NativeKey::Remote(k) => Ok(k),
            NativeKey::Embedded(_) => Err(DatastoreError::ForeignKey {
                expected: Backend::Remote,
            }),
        }
    }

    pub(crate) fn embedded(&self) -> DatastoreResult<&tern_embedded::Key> {
        match &self.native {
            NativeKey::Embedded(k) => Ok(k),
            NativeKey::Remote(_) => Err(DatastoreError::ForeignKey {
                expected: Backend::Embedded,
            }),
        }
    }

    /// Backend this key belongs to.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match &self.native {
            NativeKey::Remote(_) => Backend::Remote,
            NativeKey::Embedded(_) => Backend::Embedded,
        }
    }

    /// Entity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match &self.native {
            NativeKey::Remote(k) => k.kind(),
            NativeKey::Embedded(k) => k.kind(),
        }
    }

    /// Numeric id, or 0 for named and incomplete keys.
    #[must_use]
    pub fn id(&self) -> i64 {
        match &self.native {
            NativeKey::Remote(k) => k.id(),
            NativeKey::Embedded(k) => k.int_id(),
        }
    }

    /// Name, or `""` for numeric and incomplete keys.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.native {
            NativeKey::Remote(k) => k.name(),
            NativeKey::Embedded(k) => k.string_id(),
        }
    }

    /// Parent key, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Key> {
        match &self.native {
            NativeKey::Remote(k) => k.parent().cloned().map(Self::from_remote),
            NativeKey::Embedded(k) => k.parent().cloned().map(Self::from_embedded),
        }
    }

    /// Whether neither id nor name is set.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        match &self.native {
            NativeKey::Remote(k) => k.incomplete(),
            NativeKey::Embedded(k) => k.incomplete(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.native {
            NativeKey::Remote(k) => fmt::Display::fmt(k, f),
            NativeKey::Embedded(k) => fmt::Display::fmt(k, f),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}: {self})", self.backend())
    }
}

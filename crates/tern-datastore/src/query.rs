//! Backend-neutral queries.
//!
//! A [`Query`] wraps the backend-native query it was created for and
//! forwards every builder call to it, translating key values on the way.
//! Builder mistakes never panic or return early: the query records them
//! and the first call to `next` on its iterator reports them.

use serde_json::Value as Json;
use tern_config::Backend;

use crate::error::{DatastoreError, DatastoreResult};
use crate::key::{Key, NativeKey};

/// Pseudo-property that filters and sorts by entity key.
pub const KEY_FIELD: &str = "__key__";

/// A value to compare a property against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any JSON value.
    Json(Json),
    /// An entity key of the query's backend.
    Key(Key),
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        Self::Key(k)
    }
}

impl From<&Key> for Value {
    fn from(k: &Key) -> Self {
        Self::Key(k.clone())
    }
}

macro_rules! from_json {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Json(v.into())
            }
        })*
    };
}

from_json!(Json, bool, i32, i64, u32, u64, f64, String, &str);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NativeQuery {
    Remote(tern_remote::Query),
    Embedded(tern_embedded::Query),
}

/// An unexecuted query over one kind. Every builder returns a new query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    native: NativeQuery,
    // Set when a key from the other backend was passed to a builder.
    foreign: bool,
}

impl Query {
    pub(crate) fn for_remote(kind: &str) -> Self {
        Self {
            native: NativeQuery::Remote(tern_remote::Query::new(kind)),
            foreign: false,
        }
    }

    pub(crate) fn for_embedded(kind: &str) -> Self {
        Self {
            native: NativeQuery::Embedded(tern_embedded::Query::new(kind)),
            foreign: false,
        }
    }

    fn map(
        &self,
        remote: impl FnOnce(&tern_remote::Query) -> tern_remote::Query,
        embedded: impl FnOnce(&tern_embedded::Query) -> tern_embedded::Query,
    ) -> Self {
        let native = match &self.native {
            NativeQuery::Remote(q) => NativeQuery::Remote(remote(q)),
            NativeQuery::Embedded(q) => NativeQuery::Embedded(embedded(q)),
        };
        Self {
            native,
            foreign: self.foreign,
        }
    }

    fn mark_foreign(&self) -> Self {
        Self {
            native: self.native.clone(),
            foreign: true,
        }
    }

    /// Restrict results to `ancestor` and its descendants.
    #[must_use]
    pub fn ancestor(&self, ancestor: &Key) -> Self {
        match (&self.native, ancestor.native()) {
            (NativeQuery::Remote(q), NativeKey::Remote(k)) => self.with_native(q.ancestor(k)),
            (NativeQuery::Embedded(q), NativeKey::Embedded(k)) => self.with_native(q.ancestor(k)),
            _ => self.mark_foreign(),
        }
    }

    fn with_native(&self, native: impl Into<NativeQuery>) -> Self {
        Self {
            native: native.into(),
            foreign: self.foreign,
        }
    }

    /// Accept possibly stale results.
    #[must_use]
    pub fn eventual_consistency(&self) -> Self {
        self.map(
            tern_remote::Query::eventual_consistency,
            tern_embedded::Query::eventual_consistency,
        )
    }

    /// Return each distinct projected row once. Only meaningful with
    /// [`Query::project`].
    #[must_use]
    pub fn distinct(&self) -> Self {
        self.map(tern_remote::Query::distinct, tern_embedded::Query::distinct)
    }

    /// Add a filter. `expr` is `"<field> <op>"` with `op` one of `=`, `!=`,
    /// `<`, `<=`, `>`, `>=`; a bare field name means `=`. Use
    /// [`KEY_FIELD`] with a key value to filter on entity keys.
    #[must_use]
    pub fn filter(&self, expr: &str, value: impl Into<Value>) -> Self {
        let expr = normalize_filter(expr);
        match (&self.native, value.into()) {
            (NativeQuery::Remote(q), Value::Json(v)) => self.with_native(q.filter(&expr, v)),
            (NativeQuery::Embedded(q), Value::Json(v)) => self.with_native(q.filter(&expr, v)),
            (NativeQuery::Remote(q), Value::Key(k)) => match k.native() {
                NativeKey::Remote(k) => self.with_native(q.filter(&expr, k)),
                NativeKey::Embedded(_) => self.mark_foreign(),
            },
            (NativeQuery::Embedded(q), Value::Key(k)) => match k.native() {
                NativeKey::Embedded(k) => self.with_native(q.filter(&expr, k)),
                NativeKey::Remote(_) => self.mark_foreign(),
            },
        }
    }

    /// Return at most `limit` results.
    #[must_use]
    pub fn limit(&self, limit: usize) -> Self {
        self.map(|q| q.limit(limit), |q| q.limit(limit))
    }

    /// Skip the first `offset` results.
    #[must_use]
    pub fn offset(&self, offset: usize) -> Self {
        self.map(|q| q.offset(offset), |q| q.offset(offset))
    }

    /// Add a sort order: `"field"` ascending, `"-field"` descending.
    #[must_use]
    pub fn order(&self, field: &str) -> Self {
        self.map(|q| q.order(field), |q| q.order(field))
    }

    /// Return only the named properties.
    #[must_use]
    pub fn project(&self, fields: &[&str]) -> Self {
        self.map(
            |q| q.project(fields),
            |q| q.project(fields.iter().copied()),
        )
    }

    /// Return keys without entity bodies.
    #[must_use]
    pub fn keys_only(&self) -> Self {
        self.map(tern_remote::Query::keys_only, tern_embedded::Query::keys_only)
    }

    /// Kind this query selects.
    #[must_use]
    pub fn kind(&self) -> &str {
        match &self.native {
            NativeQuery::Remote(q) => q.kind(),
            NativeQuery::Embedded(q) => q.kind(),
        }
    }

    /// Backend this query was built for.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match &self.native {
            NativeQuery::Remote(_) => Backend::Remote,
            NativeQuery::Embedded(_) => Backend::Embedded,
        }
    }

    /// Whether only keys are returned.
    #[must_use]
    pub fn is_keys_only(&self) -> bool {
        match &self.native {
            NativeQuery::Remote(q) => q.is_keys_only(),
            NativeQuery::Embedded(q) => q.is_keys_only(),
        }
    }

    /// The native remote query.
    pub(crate) fn remote(&self) -> DatastoreResult<&tern_remote::Query> {
        match &self.native {
            NativeQuery::Remote(q) if !self.foreign => Ok(q),
            _ => Err(DatastoreError::ForeignKey {
                expected: Backend::Remote,
            }),
        }
    }

    /// The native embedded query.
    pub(crate) fn embedded(&self) -> DatastoreResult<&tern_embedded::Query> {
        match &self.native {
            NativeQuery::Embedded(q) if !self.foreign => Ok(q),
            _ => Err(DatastoreError::ForeignKey {
                expected: Backend::Embedded,
            }),
        }
    }
}

impl From<tern_remote::Query> for NativeQuery {
    fn from(q: tern_remote::Query) -> Self {
        Self::Remote(q)
    }
}

impl From<tern_embedded::Query> for NativeQuery {
    fn from(q: tern_embedded::Query) -> Self {
        Self::Embedded(q)
    }
}

/// Rewrite `expr` as `"<field> <op>"`, adding `=` to a bare field.
///
/// Anything else is passed through so the backend reports it.
fn normalize_filter(expr: &str) -> String {
    let mut parts = expr.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(field), None, _) if !field.starts_with(['=', '!', '<', '>']) => {
            format!("{field} =")
        },
        (Some(field), Some(op), None) => format!("{field} {op}"),
        _ => expr.to_owned(),
    }
}

//! Remote entity keys.
//!
//! A [`Key`] names an entity by kind and either a numeric id or a string
//! name, optionally under a parent key. Keys are stored as a single
//! order-preserving path string (see [`Key::path`]), which is also the
//! record id in the database.

use std::fmt;
use std::sync::Arc;

use crate::error::{RemoteError, RemoteResult};

/// Table holding the per-kind id counters. No entity kind may use it.
pub(crate) const SEQUENCE_TABLE: &str = "tern_sequence";

const SEGMENT_SEP: char = '/';
const KIND_SEP: char = ':';

#[derive(Debug, PartialEq, Eq, Hash)]
struct KeyInner {
    kind: String,
    id: i64,
    name: String,
    parent: Option<Key>,
}

/// A remote entity key.
///
/// At most one of id and name is set. A key with neither is incomplete and
/// gets an id assigned when it is stored.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    inner: Arc<KeyInner>,
}

impl Key {
    fn build(kind: &str, id: i64, name: &str, parent: Option<&Key>) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                kind: kind.to_owned(),
                id,
                name: name.to_owned(),
                parent: parent.cloned(),
            }),
        }
    }

    /// A key with a numeric id.
    #[must_use]
    pub fn id_key(kind: &str, id: i64, parent: Option<&Key>) -> Self {
        Self::build(kind, id, "", parent)
    }

    /// A key with a string name.
    #[must_use]
    pub fn name_key(kind: &str, name: &str, parent: Option<&Key>) -> Self {
        Self::build(kind, 0, name, parent)
    }

    /// A key whose id will be assigned by the store.
    #[must_use]
    pub fn incomplete_key(kind: &str, parent: Option<&Key>) -> Self {
        Self::build(kind, 0, "", parent)
    }

    pub(crate) fn with_id(&self, id: i64) -> Self {
        Self::build(&self.inner.kind, id, "", self.inner.parent.as_ref())
    }

    /// Kind of the entity.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Numeric id, or 0 if the key has a name or is incomplete.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.inner.id
    }

    /// String name, or empty if the key has an id or is incomplete.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Parent key, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Key> {
        self.inner.parent.as_ref()
    }

    /// Whether the key still needs an id.
    #[must_use]
    pub fn incomplete(&self) -> bool {
        self.inner.id == 0 && self.inner.name.is_empty()
    }

    /// Check the key is well formed. Incomplete keys are rejected unless
    /// `allow_incomplete` is set; parents must always be complete.
    pub(crate) fn valid(&self, allow_incomplete: bool) -> RemoteResult<()> {
        if self.inner.kind.is_empty() {
            return Err(RemoteError::InvalidKey("empty kind".into()));
        }
        if self.inner.kind == SEQUENCE_TABLE {
            return Err(RemoteError::InvalidKey(format!(
                "kind {SEQUENCE_TABLE} is reserved"
            )));
        }
        if self.inner.id < 0 {
            return Err(RemoteError::InvalidKey(format!(
                "negative id {}",
                self.inner.id
            )));
        }
        if self.inner.id != 0 && !self.inner.name.is_empty() {
            return Err(RemoteError::InvalidKey("both id and name set".into()));
        }
        if !allow_incomplete && self.incomplete() {
            return Err(RemoteError::InvalidKey(format!("incomplete key {self}")));
        }
        if let Some(parent) = &self.inner.parent {
            parent.valid(false)?;
        }
        Ok(())
    }

    fn segment(&self) -> String {
        let kind = escape(&self.inner.kind);
        if self.inner.name.is_empty() {
            format!("{kind}{KIND_SEP}i{:019}", self.inner.id)
        } else {
            format!("{kind}{KIND_SEP}s{}", escape(&self.inner.name))
        }
    }

    /// Encoded path of the key, root first.
    ///
    /// Paths compare in the same order as keys: by ancestors first, ids
    /// before names, ids numerically.
    #[must_use]
    pub fn path(&self) -> String {
        let mut segments = vec![self.segment()];
        let mut cur = self.parent();
        while let Some(k) = cur {
            segments.push(k.segment());
            cur = k.parent();
        }
        segments.reverse();
        segments.join(&SEGMENT_SEP.to_string())
    }

    /// Paths of the key and all its ancestors.
    pub(crate) fn lineage(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut cur = Some(self);
        while let Some(k) = cur {
            paths.push(k.path());
            cur = k.parent();
        }
        paths
    }

    /// Rebuild a key from its [`path`](Self::path).
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidKey`] if the path is malformed.
    pub fn from_path(path: &str) -> RemoteResult<Self> {
        let mut key: Option<Key> = None;
        for segment in path.split(SEGMENT_SEP) {
            let (kind, id) = segment
                .split_once(KIND_SEP)
                .ok_or_else(|| RemoteError::InvalidKey(format!("bad path segment {segment:?}")))?;
            let kind = unescape(kind)?;
            let next = match id.split_at_checked(1) {
                Some(("i", digits)) => {
                    let id = digits.parse::<i64>().map_err(|e| {
                        RemoteError::InvalidKey(format!("bad id in {segment:?}: {e}"))
                    })?;
                    Key::id_key(&kind, id, key.as_ref())
                },
                Some(("s", name)) => Key::name_key(&kind, &unescape(name)?, key.as_ref()),
                _ => {
                    return Err(RemoteError::InvalidKey(format!(
                        "bad path segment {segment:?}"
                    )));
                },
            };
            key = Some(next);
        }
        key.ok_or_else(|| RemoteError::InvalidKey("empty path".into()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent}/")?;
        }
        if self.inner.name.is_empty() {
            write!(f, "{},{}", self.inner.kind, self.inner.id)
        } else {
            write!(f, "{},{:?}", self.inner.kind, self.inner.name)
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            SEGMENT_SEP => out.push_str("%2F"),
            KIND_SEP => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> RemoteResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest
            .get(pos.saturating_add(1)..pos.saturating_add(3))
            .ok_or_else(|| RemoteError::InvalidKey(format!("truncated escape in {s:?}")))?;
        out.push(match code {
            "25" => '%',
            "2F" => SEGMENT_SEP,
            "3A" => KIND_SEP,
            _ => return Err(RemoteError::InvalidKey(format!("bad escape %{code} in {s:?}"))),
        });
        rest = &rest[pos.saturating_add(3)..];
    }
    out.push_str(rest);
    Ok(out)
}

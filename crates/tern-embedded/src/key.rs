//! Hierarchical entity keys.
//!
//! A [`Key`] names one entity: a kind, an integer id or a string id (or
//! neither, for keys awaiting an allocated id), an optional parent, and the
//! app it belongs to. Keys are cheap to clone and never change once built.
//!
//! Keys order the way the engine returns query results by default: root
//! first, then element by element, kind before id, integer ids before
//! string ids.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{EmbeddedError, EmbeddedResult};

/// Identifier part of one path element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyId {
    Incomplete,
    Int(i64),
    Str(String),
}

impl KeyId {
    fn rank(&self) -> u8 {
        match self {
            Self::Incomplete => 0,
            Self::Int(_) => 1,
            Self::Str(_) => 2,
        }
    }
}

impl Ord for KeyId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct KeyInner {
    app_id: String,
    kind: String,
    id: KeyId,
    parent: Option<Key>,
}

/// Identity and location of one stored entity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    inner: Arc<KeyInner>,
}

impl Key {
    /// Build a key in the context's app.
    ///
    /// `string_id` wins if both ids are set; pass `""` and `0` for an
    /// incomplete key. Nothing is validated here: malformed keys are
    /// rejected by the operation that receives them.
    #[must_use]
    pub fn new(
        ctx: &Context,
        kind: impl Into<String>,
        string_id: impl Into<String>,
        int_id: i64,
        parent: Option<&Key>,
    ) -> Self {
        let string_id = string_id.into();
        let id = if !string_id.is_empty() {
            KeyId::Str(string_id)
        } else if int_id != 0 {
            KeyId::Int(int_id)
        } else {
            KeyId::Incomplete
        };
        Self::from_parts(ctx.app_id().to_owned(), kind.into(), id, parent.cloned())
    }

    /// Build a key with neither id set, to be completed by a write.
    #[must_use]
    pub fn new_incomplete(ctx: &Context, kind: impl Into<String>, parent: Option<&Key>) -> Self {
        Self::new(ctx, kind, "", 0, parent)
    }

    fn from_parts(app_id: String, kind: String, id: KeyId, parent: Option<Key>) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                app_id,
                kind,
                id,
                parent,
            }),
        }
    }

    /// Copy of this key with an allocated integer id.
    pub(crate) fn with_int_id(&self, id: i64) -> Self {
        Self::from_parts(
            self.inner.app_id.clone(),
            self.inner.kind.clone(),
            KeyId::Int(id),
            self.inner.parent.clone(),
        )
    }

    /// The app this key belongs to.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    /// The entity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Integer id, or 0 when the key uses a string id or is incomplete.
    #[must_use]
    pub fn int_id(&self) -> i64 {
        match self.inner.id {
            KeyId::Int(id) => id,
            _ => 0,
        }
    }

    /// String id, or `""` when the key uses an integer id or is incomplete.
    #[must_use]
    pub fn string_id(&self) -> &str {
        match &self.inner.id {
            KeyId::Str(name) => name,
            _ => "",
        }
    }

    /// The parent key, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Key> {
        self.inner.parent.as_ref()
    }

    /// Whether neither id is set.
    #[must_use]
    pub fn incomplete(&self) -> bool {
        self.inner.id == KeyId::Incomplete
    }

    /// Whether `ancestor` is this key or one of its parents.
    #[must_use]
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut cur = Some(self);
        while let Some(k) = cur {
            if k == ancestor {
                return true;
            }
            cur = k.parent();
        }
        false
    }

    /// Check the key is usable: non-empty kind, positive integer id, a
    /// complete parent path, and a single app along the path.
    pub(crate) fn validate(&self, allow_incomplete: bool) -> EmbeddedResult<()> {
        if self.kind().is_empty() {
            return Err(EmbeddedError::InvalidKey("empty kind".into()));
        }
        if self.incomplete() && !allow_incomplete {
            return Err(EmbeddedError::InvalidKey(format!(
                "incomplete key of kind {}",
                self.kind()
            )));
        }
        if self.int_id() < 0 {
            return Err(EmbeddedError::InvalidKey(format!(
                "negative id {}",
                self.int_id()
            )));
        }
        if let Some(parent) = self.parent() {
            if parent.app_id() != self.app_id() {
                return Err(EmbeddedError::InvalidKey(format!(
                    "parent belongs to app {}, key to {}",
                    parent.app_id(),
                    self.app_id()
                )));
            }
            parent.validate(false)?;
        }
        Ok(())
    }

    /// Path elements from the root down to this key.
    fn path(&self) -> Vec<&Key> {
        let mut path = Vec::new();
        let mut cur = Some(self);
        while let Some(k) = cur {
            path.push(k);
            cur = k.parent();
        }
        path.reverse();
        path
    }

    /// URL-safe string form; [`Key::decode`] reverses it.
    #[must_use]
    pub fn encode(&self) -> String {
        let wire = WireKey {
            app: self.app_id().to_owned(),
            path: self
                .path()
                .into_iter()
                .map(|k| WireElement {
                    kind: k.kind().to_owned(),
                    id: match &k.inner.id {
                        KeyId::Incomplete => None,
                        KeyId::Int(id) => Some(WireId::Int(*id)),
                        KeyId::Str(name) => Some(WireId::Str(name.clone())),
                    },
                })
                .collect(),
        };
        // Serializing plain strings and integers cannot fail.
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Parse a key produced by [`Key::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::InvalidKey`] if the string is not an
    /// encoded key.
    pub fn decode(encoded: &str) -> EmbeddedResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| EmbeddedError::InvalidKey(format!("bad key encoding: {e}")))?;
        let wire: WireKey = serde_json::from_slice(&bytes)
            .map_err(|e| EmbeddedError::InvalidKey(format!("bad key payload: {e}")))?;

        let mut key: Option<Key> = None;
        for element in wire.path {
            let id = match element.id {
                None => KeyId::Incomplete,
                Some(WireId::Int(id)) => KeyId::Int(id),
                Some(WireId::Str(name)) => KeyId::Str(name),
            };
            key = Some(Self::from_parts(wire.app.clone(), element.kind, id, key));
        }
        key.ok_or_else(|| EmbeddedError::InvalidKey("empty key path".into()))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.path(), other.path());
        for (x, y) in a.iter().zip(b.iter()) {
            let ord = x
                .kind()
                .cmp(y.kind())
                .then_with(|| x.inner.id.cmp(&y.inner.id));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len()
            .cmp(&b.len())
            .then_with(|| self.app_id().cmp(other.app_id()))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, k) in self.path().into_iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match &k.inner.id {
                KeyId::Incomplete => write!(f, "{},?", k.kind())?,
                KeyId::Int(id) => write!(f, "{},{id}", k.kind())?,
                KeyId::Str(name) => write!(f, "{},{name:?}", k.kind())?,
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct WireKey {
    app: String,
    path: Vec<WireElement>,
}

#[derive(Serialize, Deserialize)]
struct WireElement {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<WireId>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireId {
    Int(i64),
    Str(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::in_memory("test-app").unwrap()
    }

    #[test]
    fn test_string_id_wins_over_int_id() {
        let k = Key::new(&ctx(), "User", "alice", 7, None);
        assert_eq!(k.string_id(), "alice");
        assert_eq!(k.int_id(), 0);
        assert!(!k.incomplete());
    }

    #[test]
    fn test_incomplete_key() {
        let k = Key::new_incomplete(&ctx(), "Task", None);
        assert!(k.incomplete());
        assert!(k.validate(true).is_ok());
        assert!(k.validate(false).is_err());
    }

    #[test]
    fn test_incomplete_parent_is_invalid() {
        let c = ctx();
        let parent = Key::new_incomplete(&c, "List", None);
        let child = Key::new(&c, "Task", "", 3, Some(&parent));
        assert!(matches!(
            child.validate(false),
            Err(EmbeddedError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_encode_decode_preserves_path() {
        let c = ctx();
        let root = Key::new(&c, "List", "groceries", 0, None);
        let child = Key::new(&c, "Task", "", 42, Some(&root));
        let decoded = Key::decode(&child.encode()).unwrap();
        assert_eq!(decoded, child);
        assert_eq!(decoded.parent(), Some(&root));
        assert_eq!(decoded.app_id(), "test-app");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Key::decode("not a key!").is_err());
        assert!(Key::decode("").is_err());
    }

    #[test]
    fn test_ordering_ints_before_strings_and_parents_first() {
        let c = ctx();
        let a = Key::new(&c, "K", "", 2, None);
        let b = Key::new(&c, "K", "", 10, None);
        let s = Key::new(&c, "K", "a", 0, None);
        let child = Key::new(&c, "C", "", 1, Some(&a));
        assert!(a < b);
        assert!(b < s);
        assert!(a < child);
        assert!(child < b);
    }

    #[test]
    fn test_has_ancestor_includes_self() {
        let c = ctx();
        let root = Key::new(&c, "List", "l", 0, None);
        let child = Key::new(&c, "Task", "", 1, Some(&root));
        assert!(child.has_ancestor(&root));
        assert!(child.has_ancestor(&child));
        assert!(!root.has_ancestor(&child));
    }

    #[test]
    fn test_display() {
        let c = ctx();
        let root = Key::new(&c, "List", "l", 0, None);
        let child = Key::new(&c, "Task", "", 9, Some(&root));
        assert_eq!(child.to_string(), "List,\"l\"/Task,9");
    }
}

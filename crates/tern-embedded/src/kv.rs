//! Raw key-value layer underneath the entity engine.
//!
//! The [`KvStore`] trait provides namespaced byte-level `get`/`set`/`delete`
//! and key listing. The engine stores one namespace per `(app, kind)` pair
//! and keeps its id sequence in a reserved metadata namespace.
//!
//! Implementations:
//!
//! - **In-memory** (always available): for tests and ephemeral apps
//! - **`SurrealKV`** (behind `kv` feature): persistent, versioned, ACID

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Namespaces must be non-empty and free of the null byte, which separates
/// namespace from key in composite keys.
pub(crate) fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Build the composite key `"{namespace}\0{key}"` as bytes.
#[cfg(feature = "kv")]
fn composite_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(key.len()).saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf.extend_from_slice(key.as_bytes());
    buf
}

/// Namespace range bounds: `["{namespace}\0", "{namespace}\x01")` holds
/// exactly the keys of the namespace.
#[cfg(feature = "kv")]
fn namespace_range(namespace: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = Vec::with_capacity(namespace.len().saturating_add(1));
    start.extend_from_slice(namespace.as_bytes());
    let mut end = start.clone();
    start.push(0);
    end.push(1);
    (start, end)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Raw key-value store trait.
///
/// All operations are scoped to a namespace.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by namespace and key. `None` if absent.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value, overwriting any existing one.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List all keys in a namespace in ascending byte order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Atomically add `by` to the decimal counter stored under `key`
    /// (absent counts as 0) and return the new value.
    ///
    /// Every handle to the same store must observe one sequence of
    /// increments, however many contexts share it.
    async fn increment(&self, namespace: &str, key: &str, by: i64) -> StorageResult<i64>;
}

/// Parse a stored counter and add `by`.
fn bump(current: Option<&[u8]>, by: i64) -> StorageResult<i64> {
    let current = match current {
        Some(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| StorageError::Internal("corrupt counter".into()))?,
        None => 0,
    };
    current
        .checked_add(by)
        .ok_or_else(|| StorageError::Internal("counter overflow".into()))
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory key-value store.
///
/// One ordered map per namespace, so listing is a plain in-order walk.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: std::sync::RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(poisoned)?;
        data.entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(poisoned)?;
        let Some(ns) = data.get_mut(namespace) else {
            return Ok(false);
        };
        let existed = ns.remove(key).is_some();
        if ns.is_empty() {
            data.remove(namespace);
        }
        Ok(existed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn increment(&self, namespace: &str, key: &str, by: i64) -> StorageResult<i64> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(poisoned)?;
        let ns = data.entry(namespace.to_owned()).or_default();
        let next = bump(ns.get(key).map(Vec::as_slice), by)?;
        ns.insert(key.to_owned(), next.to_string().into_bytes());
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// SurrealKV implementation (behind `kv` feature)
// ---------------------------------------------------------------------------

/// Persistent key-value store backed by `SurrealKV`.
///
/// ```rust,ignore
/// use tern_embedded::kv::SurrealKvStore;
///
/// let store = SurrealKvStore::open("./data/entities")?;
/// ```
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
    // Serializes counter read-modify-write transactions.
    counters: tokio::sync::Mutex<()>,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open a persistent KV store at the given directory path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the store cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::info!(path = %path.as_ref().display(), "opened surrealkv entity store");
        Ok(Self {
            tree,
            counters: tokio::sync::Mutex::new(()),
        })
    }

    /// Close the store, flushing pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the flush fails.
    pub async fn close(&self) -> StorageResult<()> {
        self.tree.close().await.map_err(|ref e| map_kv_err(e))
    }
}

#[cfg(feature = "kv")]
fn map_kv_err(e: &surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        tx.get(&ck).map_err(|ref e| map_kv_err(e))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        tx.set(&ck, &value).map_err(|ref e| map_kv_err(e))?;
        tx.commit().await.map_err(|ref e| map_kv_err(e))
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let existed = tx.get(&ck).map_err(|ref e| map_kv_err(e))?.is_some();
        if existed {
            tx.delete(&ck).map_err(|ref e| map_kv_err(e))?;
            tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        }
        Ok(existed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let (start, end) = namespace_range(namespace);
        let prefix_len = start.len();

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut iter = tx.range(&start, &end).map_err(|ref e| map_kv_err(e))?;
        iter.seek_first().map_err(|ref e| map_kv_err(e))?;

        let mut keys = Vec::new();
        while iter.valid() {
            let raw_key = iter.key();
            if raw_key.len() > prefix_len {
                match std::str::from_utf8(&raw_key[prefix_len..]) {
                    Ok(key) => keys.push(key.to_owned()),
                    Err(_) => tracing::warn!(namespace, "skipping non-utf8 key"),
                }
            }
            iter.next().map_err(|ref e| map_kv_err(e))?;
        }
        Ok(keys)
    }

    async fn increment(&self, namespace: &str, key: &str, by: i64) -> StorageResult<i64> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let _guard = self.counters.lock().await;
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let current = tx.get(&ck).map_err(|ref e| map_kv_err(e))?;
        let next = bump(current.as_deref(), by)?;
        tx.set(&ck, next.to_string().as_bytes())
            .map_err(|ref e| map_kv_err(e))?;
        tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        Ok(next)
    }
}

//! Remote client: connection handle and entity operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::{debug, info};

use crate::error::{RemoteError, RemoteResult, batch};
use crate::iter::Iter;
use crate::key::{Key, SEQUENCE_TABLE};
use crate::query::{Query, Statement};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8000";
/// Database namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "tern";
/// Rows fetched per round trip while iterating.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Database endpoint, e.g. `ws://host:8000` or `mem://`.
    pub endpoint: String,
    /// Database namespace; the project id selects the database inside it.
    pub namespace: String,
    /// Rows fetched per round trip while iterating.
    pub page_size: usize,
    /// Root user name. Sign-in happens only when both credentials are set.
    pub username: Option<String>,
    /// Root password.
    pub password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            namespace: DEFAULT_NAMESPACE.into(),
            page_size: DEFAULT_PAGE_SIZE,
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("page_size", &self.page_size)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A stored record as read back from the database.
#[derive(Debug, Deserialize)]
pub(crate) struct Row {
    pub(crate) path: String,
    pub(crate) doc: String,
}

#[derive(Deserialize)]
struct Counter {
    value: i64,
}

/// Handle to one project's entities in a remote database.
///
/// Cheap to clone; clones share the connection and the closed flag.
#[derive(Clone)]
pub struct Client {
    db: Surreal<Any>,
    project_id: Arc<str>,
    page_size: usize,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("project_id", &self.project_id)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn connection(e: surrealdb::Error) -> RemoteError {
    RemoteError::Connection(e.to_string())
}

impl Client {
    /// Connect to the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Connection`] if the connection fails.
    pub async fn new(project_id: &str) -> RemoteResult<Self> {
        Self::connect(project_id, &Settings::default()).await
    }

    /// Connect with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Connection`] if the project id is empty or the
    /// endpoint cannot be reached or signed in to.
    pub async fn connect(project_id: &str, settings: &Settings) -> RemoteResult<Self> {
        if project_id.is_empty() {
            return Err(RemoteError::Connection("empty project id".into()));
        }
        let db: Surreal<Any> = Surreal::init();
        db.connect(settings.endpoint.as_str())
            .await
            .map_err(connection)?;
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await
            .map_err(connection)?;
        }
        db.use_ns(settings.namespace.as_str())
            .use_db(project_id)
            .await
            .map_err(connection)?;
        info!(
            endpoint = %settings.endpoint,
            project = project_id,
            "connected to remote store"
        );
        Ok(Self {
            db,
            project_id: project_id.into(),
            page_size: settings.page_size.max(1),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Project this client is bound to.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    fn ensure_open(&self) -> RemoteResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(RemoteError::Closed)
        } else {
            Ok(())
        }
    }

    /// Load the entity stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NoSuchEntity`] if nothing is stored there and
    /// [`RemoteError::InvalidKey`] if the key is incomplete.
    pub async fn get<T: DeserializeOwned>(&self, key: &Key) -> RemoteResult<T> {
        self.ensure_open()?;
        key.valid(false)?;
        let mut response = self
            .db
            .query("SELECT * FROM type::thing($tb, $id)")
            .bind(("tb", key.kind().to_owned()))
            .bind(("id", key.path()))
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        let row = rows.into_iter().next().ok_or(RemoteError::NoSuchEntity)?;
        Ok(serde_json::from_str(&row.doc)?)
    }

    /// Load several entities.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Multi`] if any key fails.
    pub async fn get_multi<T: DeserializeOwned>(&self, keys: &[Key]) -> RemoteResult<Vec<T>> {
        self.ensure_open()?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await);
        }
        batch(results)
    }

    /// Store `src` under `key` and return the complete key.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidEntity`] if `src` is not a JSON object.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &Key, src: &T) -> RemoteResult<Key> {
        self.ensure_open()?;
        key.valid(true)?;
        let props = serde_json::to_value(src)?;
        if !props.is_object() {
            return Err(RemoteError::InvalidEntity(format!(
                "expected an object, got {props}"
            )));
        }
        let key = if key.incomplete() {
            key.with_id(self.reserve(key.kind(), 1).await?)
        } else {
            key.clone()
        };
        let content = json!({
            "path": key.path(),
            "lineage": key.lineage(),
            "doc": props.to_string(),
            "props": props,
        });
        self.db
            .query("UPSERT type::thing($tb, $id) CONTENT $content")
            .bind(("tb", key.kind().to_owned()))
            .bind(("id", key.path()))
            .bind(("content", content))
            .await?
            .check()?;
        debug!(key = %key, "remote put");
        Ok(key)
    }

    /// Store several entities.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::LengthMismatch`] if the slices differ in
    /// length, or [`RemoteError::Multi`] if any element fails.
    pub async fn put_multi<T: Serialize>(&self, keys: &[Key], src: &[T]) -> RemoteResult<Vec<Key>> {
        self.ensure_open()?;
        if keys.len() != src.len() {
            return Err(RemoteError::LengthMismatch {
                keys: keys.len(),
                values: src.len(),
            });
        }
        let mut results = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(src) {
            results.push(self.put(key, value).await);
        }
        batch(results)
    }

    /// Delete the entity under `key`. Missing entities are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidKey`] for incomplete keys.
    pub async fn delete(&self, key: &Key) -> RemoteResult<()> {
        self.ensure_open()?;
        key.valid(false)?;
        self.db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", key.kind().to_owned()))
            .bind(("id", key.path()))
            .await?
            .check()?;
        debug!(key = %key, "remote delete");
        Ok(())
    }

    /// Delete several entities.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Multi`] if any key fails.
    pub async fn delete_multi(&self, keys: &[Key]) -> RemoteResult<()> {
        self.ensure_open()?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.delete(key).await);
        }
        batch(results).map(|_| ())
    }

    /// Reserve ids for incomplete keys without storing anything.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidKey`] if any key is complete.
    pub async fn allocate_ids(&self, keys: &[Key]) -> RemoteResult<Vec<Key>> {
        self.ensure_open()?;
        let mut wanted: BTreeMap<&str, i64> = BTreeMap::new();
        for key in keys {
            key.valid(true)?;
            if !key.incomplete() {
                return Err(RemoteError::InvalidKey(format!(
                    "{key} already has an id"
                )));
            }
            let n = wanted.entry(key.kind()).or_default();
            *n = n.saturating_add(1);
        }
        let mut next: BTreeMap<&str, i64> = BTreeMap::new();
        for (kind, count) in wanted {
            next.insert(kind, self.reserve(kind, count).await?);
        }
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let slot = next
                .get_mut(key.kind())
                .ok_or_else(|| RemoteError::InvalidKey(format!("no ids reserved for {key}")))?;
            out.push(key.with_id(*slot));
            *slot = slot.saturating_add(1);
        }
        Ok(out)
    }

    /// Start iterating over the results of `query`.
    #[must_use]
    pub fn run(&self, query: &Query) -> Iter {
        Iter::new(self.clone(), query.clone())
    }

    /// Collect every result of `query`.
    ///
    /// Keys-only queries return an empty entity list.
    ///
    /// # Errors
    ///
    /// Returns the first error other than [`RemoteError::Done`].
    pub async fn get_all<T: DeserializeOwned>(&self, query: &Query) -> RemoteResult<(Vec<Key>, Vec<T>)> {
        let mut it = self.run(query);
        let mut keys = Vec::new();
        let mut values = Vec::new();
        loop {
            if query.is_keys_only() {
                match it.next_key().await {
                    Ok(key) => keys.push(key),
                    Err(RemoteError::Done) => break,
                    Err(e) => return Err(e),
                }
            } else {
                match it.next::<T>().await {
                    Ok((key, value)) => {
                        keys.push(key);
                        values.push(value);
                    },
                    Err(RemoteError::Done) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok((keys, values))
    }

    /// Mark the client closed. Later operations on it, its clones and its
    /// iterators fail with [`RemoteError::Closed`].
    ///
    /// # Errors
    ///
    /// Never fails; closing twice is allowed.
    pub fn close(&self) -> RemoteResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(project = %self.project_id, "remote client closed");
        }
        Ok(())
    }

    pub(crate) async fn fetch(&self, stmt: Statement) -> RemoteResult<Vec<Row>> {
        self.ensure_open()?;
        debug!(sql = %stmt.sql, "remote query page");
        let mut response = self.db.query(stmt.sql).bind(stmt.vars).await?;
        Ok(response.take(0)?)
    }

    /// Advance the kind's id sequence by `count` and return the first id of
    /// the reserved block.
    async fn reserve(&self, kind: &str, count: i64) -> RemoteResult<i64> {
        let mut response = self
            .db
            .query("UPSERT type::thing($seq, $tb) SET value = (value OR 0) + $n RETURN AFTER")
            .bind(("seq", SEQUENCE_TABLE))
            .bind(("tb", kind.to_owned()))
            .bind(("n", count))
            .await?;
        let counters: Vec<Counter> = response.take(0)?;
        let last = counters
            .first()
            .map(|c| c.value)
            .ok_or_else(|| RemoteError::Connection("id sequence update returned nothing".into()))?;
        last.checked_sub(count)
            .and_then(|v| v.checked_add(1))
            .ok_or_else(|| RemoteError::InvalidKey("id sequence overflow".into()))
    }
}

//! The backend-neutral client.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tern_config::{Backend, Config};
use tern_embedded::Context;
use tern_remote::Settings;
use tracing::info;

use crate::embedded::{self, EmbeddedAdapter};
use crate::error::{DatastoreError, DatastoreResult};
use crate::iter::Iter;
use crate::key::Key;
use crate::query::Query;
use crate::remote::{self, RemoteAdapter};

#[derive(Debug, Clone)]
enum Adapter {
    Remote(RemoteAdapter),
    Embedded(EmbeddedAdapter),
}

/// Route one call to whichever adapter the client holds.
macro_rules! dispatch {
    ($self:ident, $adapter:ident => $call:expr) => {
        match &$self.adapter {
            Adapter::Remote($adapter) => $call,
            Adapter::Embedded($adapter) => $call,
        }
    };
}

/// Entry point for storing and querying entities.
///
/// A client talks to exactly one backend, chosen when it is built. Keys,
/// queries and iterators it hands out only work with clients of the same
/// backend; passing another backend's key fails with
/// [`DatastoreError::ForeignKey`].
///
/// Clones share the underlying connection or context.
#[derive(Debug, Clone)]
pub struct Client {
    adapter: Adapter,
}

impl Client {
    /// Connect to the remote backend's default endpoint for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Remote`] if the connection fails.
    pub async fn remote(project_id: &str) -> DatastoreResult<Self> {
        Self::connect_remote(project_id, &Settings::default()).await
    }

    /// Connect to the remote backend with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Remote`] if the connection fails.
    pub async fn connect_remote(project_id: &str, settings: &Settings) -> DatastoreResult<Self> {
        let client = tern_remote::Client::connect(project_id, settings).await?;
        Ok(Self {
            adapter: Adapter::Remote(RemoteAdapter::new(client)),
        })
    }

    /// Use the embedded backend through `ctx`.
    #[must_use]
    pub fn embedded(ctx: Context) -> Self {
        Self {
            adapter: Adapter::Embedded(EmbeddedAdapter::new(ctx)),
        }
    }

    /// Build the backend selected by `config.store.backend`.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::Config`] if the embedded store needs the
    /// `kv` feature, or the backend's error if it cannot be opened.
    pub async fn from_config(config: &Config) -> DatastoreResult<Self> {
        let store = &config.store;
        let client = match store.backend {
            Backend::Remote => {
                Self::connect_remote(&store.remote.project_id, &remote::settings(&store.remote))
                    .await?
            },
            Backend::Embedded => Self::embedded(embedded::context(&store.embedded)?),
        };
        info!(backend = %store.backend, "datastore client ready");
        Ok(client)
    }

    /// Backend this client talks to.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match &self.adapter {
            Adapter::Remote(_) => Backend::Remote,
            Adapter::Embedded(_) => Backend::Embedded,
        }
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    /// A complete key with numeric `id`. The id is checked by the operation
    /// that receives the key.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::ForeignKey`] if `parent` belongs to the
    /// other backend.
    pub fn id_key(&self, kind: &str, id: i64, parent: Option<&Key>) -> DatastoreResult<Key> {
        dispatch!(self, a => a.id_key(kind, id, parent))
    }

    /// A complete key with `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::ForeignKey`] if `parent` belongs to the
    /// other backend.
    pub fn name_key(&self, kind: &str, name: &str, parent: Option<&Key>) -> DatastoreResult<Key> {
        dispatch!(self, a => a.name_key(kind, name, parent))
    }

    /// A key with neither id nor name, completed by [`Client::put`] or
    /// [`Client::allocate_ids`].
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError::ForeignKey`] if `parent` belongs to the
    /// other backend.
    pub fn incomplete_key(&self, kind: &str, parent: Option<&Key>) -> DatastoreResult<Key> {
        dispatch!(self, a => a.incomplete_key(kind, parent))
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Load the entity stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns the backend's not-found error if nothing is stored there
    /// (see [`DatastoreError::is_not_found`]).
    pub async fn get<T: DeserializeOwned>(&self, key: &Key) -> DatastoreResult<T> {
        dispatch!(self, a => a.get(key).await)
    }

    /// Load several entities, index-aligned with `keys`.
    ///
    /// # Errors
    ///
    /// Returns the backend's batch error if any element failed (see
    /// [`DatastoreError::multi_errors`]).
    pub async fn get_multi<T: DeserializeOwned>(&self, keys: &[Key]) -> DatastoreResult<Vec<T>> {
        dispatch!(self, a => a.get_multi(keys).await)
    }

    /// Store `src` under `key` and return the stored key. Incomplete keys
    /// come back with a backend-assigned id.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the key or entity is invalid or the
    /// write fails.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &Key, src: &T) -> DatastoreResult<Key> {
        dispatch!(self, a => a.put(key, src).await)
    }

    /// Store several entities; keys and values are paired by index.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the lengths differ or any element
    /// fails.
    pub async fn put_multi<T: Serialize>(&self, keys: &[Key], src: &[T]) -> DatastoreResult<Vec<Key>> {
        dispatch!(self, a => a.put_multi(keys, src).await)
    }

    /// Delete the entity under `key`. Deleting a missing entity succeeds.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the key is invalid or the delete fails.
    pub async fn delete(&self, key: &Key) -> DatastoreResult<()> {
        dispatch!(self, a => a.delete(key).await)
    }

    /// Delete several entities.
    ///
    /// # Errors
    ///
    /// Returns the backend's batch error if any element fails.
    pub async fn delete_multi(&self, keys: &[Key]) -> DatastoreResult<()> {
        dispatch!(self, a => a.delete_multi(keys).await)
    }

    /// Reserve ids for incomplete keys without writing anything.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if any key is complete or invalid.
    pub async fn allocate_ids(&self, keys: &[Key]) -> DatastoreResult<Vec<Key>> {
        dispatch!(self, a => a.allocate_ids(keys).await)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// A query over every entity of `kind`.
    #[must_use]
    pub fn new_query(&self, kind: &str) -> Query {
        dispatch!(self, a => a.new_query(kind))
    }

    /// Start running `query`. Nothing is read until [`Iter::next`].
    ///
    /// A query built by a client of the other backend yields an iterator
    /// whose every call fails with [`DatastoreError::ForeignKey`].
    #[must_use]
    pub fn run(&self, query: &Query) -> Iter {
        dispatch!(self, a => a.run(query))
    }

    /// Run `query` to completion. For keys-only queries the value list is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns the first error other than [`DatastoreError::Done`] that the
    /// iterator reports.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        query: &Query,
    ) -> DatastoreResult<(Vec<Key>, Vec<T>)> {
        let keys_only = query.is_keys_only();
        let mut it = self.run(query);
        let (mut keys, mut values) = (Vec::new(), Vec::new());
        loop {
            let step = if keys_only {
                it.next_key().await.map(|key| (key, None))
            } else {
                it.next::<T>().await.map(|(key, value)| (key, Some(value)))
            };
            match step {
                Ok((key, value)) => {
                    keys.push(key);
                    values.extend(value);
                },
                Err(DatastoreError::Done) => break,
                Err(e) => return Err(e),
            }
        }
        Ok((keys, values))
    }

    /// Release the client. Remote clients and their clones reject later
    /// calls; for the embedded backend this does nothing.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if closing fails.
    pub fn close(&self) -> DatastoreResult<()> {
        dispatch!(self, a => a.close())
    }
}

//! Adapter over the embedded backend.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tern_config::{Backend, EmbeddedSection};
use tern_embedded::{Context, datastore};
use tracing::debug;

use crate::error::DatastoreResult;
use crate::iter::Iter;
use crate::key::Key;
use crate::query::Query;

#[derive(Debug, Clone)]
pub(crate) struct EmbeddedAdapter {
    ctx: Context,
}

/// Context for an `[store.embedded]` section.
pub(crate) fn context(section: &EmbeddedSection) -> DatastoreResult<Context> {
    let ctx = if section.in_memory() {
        Context::in_memory(section.app_id.as_str())?
    } else {
        open(section)?
    };
    Ok(if section.timeout_secs > 0 {
        ctx.with_timeout(Duration::from_secs(section.timeout_secs))
    } else {
        ctx
    })
}

#[cfg(feature = "kv")]
fn open(section: &EmbeddedSection) -> DatastoreResult<Context> {
    Ok(Context::open(&section.path, section.app_id.as_str())?)
}

#[cfg(not(feature = "kv"))]
fn open(_section: &EmbeddedSection) -> DatastoreResult<Context> {
    Err(tern_config::ConfigError::ValidationError {
        field: "store.embedded.path".to_owned(),
        message: "persistent embedded stores need the `kv` feature".to_owned(),
    }
    .into())
}

fn native_keys(keys: &[Key]) -> DatastoreResult<Vec<tern_embedded::Key>> {
    keys.iter().map(|k| k.embedded().cloned()).collect()
}

fn wrap_keys(keys: Vec<tern_embedded::Key>) -> Vec<Key> {
    keys.into_iter().map(Key::from_embedded).collect()
}

impl EmbeddedAdapter {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn parent(parent: Option<&Key>) -> DatastoreResult<Option<&tern_embedded::Key>> {
        parent.map(Key::embedded).transpose()
    }

    pub(crate) fn id_key(&self, kind: &str, id: i64, parent: Option<&Key>) -> DatastoreResult<Key> {
        let parent = Self::parent(parent)?;
        Ok(Key::from_embedded(tern_embedded::Key::new(
            &self.ctx, kind, "", id, parent,
        )))
    }

    pub(crate) fn name_key(
        &self,
        kind: &str,
        name: &str,
        parent: Option<&Key>,
    ) -> DatastoreResult<Key> {
        let parent = Self::parent(parent)?;
        Ok(Key::from_embedded(tern_embedded::Key::new(
            &self.ctx, kind, name, 0, parent,
        )))
    }

    pub(crate) fn incomplete_key(&self, kind: &str, parent: Option<&Key>) -> DatastoreResult<Key> {
        let parent = Self::parent(parent)?;
        Ok(Key::from_embedded(tern_embedded::Key::new_incomplete(
            &self.ctx, kind, parent,
        )))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, key: &Key) -> DatastoreResult<T> {
        debug!(backend = "embedded", kind = key.kind(), key = %key, "get");
        Ok(datastore::get(&self.ctx, key.embedded()?).await?)
    }

    pub(crate) async fn get_multi<T: DeserializeOwned>(&self, keys: &[Key]) -> DatastoreResult<Vec<T>> {
        debug!(backend = "embedded", count = keys.len(), "get_multi");
        Ok(datastore::get_multi(&self.ctx, &native_keys(keys)?).await?)
    }

    pub(crate) async fn put<T: Serialize + ?Sized>(&self, key: &Key, src: &T) -> DatastoreResult<Key> {
        debug!(backend = "embedded", kind = key.kind(), key = %key, "put");
        Ok(Key::from_embedded(
            datastore::put(&self.ctx, key.embedded()?, src).await?,
        ))
    }

    pub(crate) async fn put_multi<T: Serialize>(
        &self,
        keys: &[Key],
        src: &[T],
    ) -> DatastoreResult<Vec<Key>> {
        debug!(backend = "embedded", count = keys.len(), "put_multi");
        Ok(wrap_keys(
            datastore::put_multi(&self.ctx, &native_keys(keys)?, src).await?,
        ))
    }

    pub(crate) async fn delete(&self, key: &Key) -> DatastoreResult<()> {
        debug!(backend = "embedded", kind = key.kind(), key = %key, "delete");
        Ok(datastore::delete(&self.ctx, key.embedded()?).await?)
    }

    pub(crate) async fn delete_multi(&self, keys: &[Key]) -> DatastoreResult<()> {
        debug!(backend = "embedded", count = keys.len(), "delete_multi");
        Ok(datastore::delete_multi(&self.ctx, &native_keys(keys)?).await?)
    }

    pub(crate) async fn allocate_ids(&self, keys: &[Key]) -> DatastoreResult<Vec<Key>> {
        debug!(backend = "embedded", count = keys.len(), "allocate_ids");
        Ok(wrap_keys(
            datastore::allocate_ids(&self.ctx, &native_keys(keys)?).await?,
        ))
    }

    #[allow(clippy::unused_self)]
    pub(crate) fn new_query(&self, kind: &str) -> Query {
        Query::for_embedded(kind)
    }

    pub(crate) fn run(&self, query: &Query) -> Iter {
        debug!(backend = "embedded", kind = query.kind(), "run");
        match query.embedded() {
            Ok(q) => Iter::embedded(q.run(&self.ctx)),
            Err(_) => Iter::rejected(Backend::Embedded),
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    pub(crate) fn close(&self) -> DatastoreResult<()> {
        debug!(backend = "embedded", app = self.ctx.app_id(), "close is a no-op");
        Ok(())
    }
}

//! Adapter over the remote backend.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tern_config::{Backend, RemoteSection};
use tern_remote::Settings;
use tracing::debug;

use crate::error::DatastoreResult;
use crate::iter::Iter;
use crate::key::Key;
use crate::query::Query;

#[derive(Debug, Clone)]
pub(crate) struct RemoteAdapter {
    client: tern_remote::Client,
}

/// Connection settings for a `[store.remote]` section.
pub(crate) fn settings(section: &RemoteSection) -> Settings {
    Settings {
        endpoint: section.endpoint.clone(),
        namespace: section.namespace.clone(),
        page_size: section.page_size,
        username: section.username.clone(),
        password: section.password.clone(),
    }
}

fn native_keys(keys: &[Key]) -> DatastoreResult<Vec<tern_remote::Key>> {
    keys.iter().map(|k| k.remote().cloned()).collect()
}

fn wrap_keys(keys: Vec<tern_remote::Key>) -> Vec<Key> {
    keys.into_iter().map(Key::from_remote).collect()
}

impl RemoteAdapter {
    pub(crate) fn new(client: tern_remote::Client) -> Self {
        Self { client }
    }

    fn parent(parent: Option<&Key>) -> DatastoreResult<Option<&tern_remote::Key>> {
        parent.map(Key::remote).transpose()
    }

    #[allow(clippy::unused_self)]
    pub(crate) fn id_key(&self, kind: &str, id: i64, parent: Option<&Key>) -> DatastoreResult<Key> {
        let parent = Self::parent(parent)?;
        Ok(Key::from_remote(tern_remote::Key::id_key(kind, id, parent)))
    }

    #[allow(clippy::unused_self)]
    pub(crate) fn name_key(
        &self,
        kind: &str,
        name: &str,
        parent: Option<&Key>,
    ) -> DatastoreResult<Key> {
        let parent = Self::parent(parent)?;
        Ok(Key::from_remote(tern_remote::Key::name_key(kind, name, parent)))
    }

    #[allow(clippy::unused_self)]
    pub(crate) fn incomplete_key(&self, kind: &str, parent: Option<&Key>) -> DatastoreResult<Key> {
        let parent = Self::parent(parent)?;
        Ok(Key::from_remote(tern_remote::Key::incomplete_key(
            kind, parent,
        )))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, key: &Key) -> DatastoreResult<T> {
        debug!(backend = "remote", kind = key.kind(), key = %key, "get");
        Ok(self.client.get(key.remote()?).await?)
    }

    pub(crate) async fn get_multi<T: DeserializeOwned>(&self, keys: &[Key]) -> DatastoreResult<Vec<T>> {
        debug!(backend = "remote", count = keys.len(), "get_multi");
        Ok(self.client.get_multi(&native_keys(keys)?).await?)
    }

    pub(crate) async fn put<T: Serialize + ?Sized>(&self, key: &Key, src: &T) -> DatastoreResult<Key> {
        debug!(backend = "remote", kind = key.kind(), key = %key, "put");
        Ok(Key::from_remote(self.client.put(key.remote()?, src).await?))
    }

    pub(crate) async fn put_multi<T: Serialize>(
        &self,
        keys: &[Key],
        src: &[T],
    ) -> DatastoreResult<Vec<Key>> {
        debug!(backend = "remote", count = keys.len(), "put_multi");
        Ok(wrap_keys(self.client.put_multi(&native_keys(keys)?, src).await?))
    }

    pub(crate) async fn delete(&self, key: &Key) -> DatastoreResult<()> {
        debug!(backend = "remote", kind = key.kind(), key = %key, "delete");
        Ok(self.client.delete(key.remote()?).await?)
    }

    pub(crate) async fn delete_multi(&self, keys: &[Key]) -> DatastoreResult<()> {
        debug!(backend = "remote", count = keys.len(), "delete_multi");
        Ok(self.client.delete_multi(&native_keys(keys)?).await?)
    }

    pub(crate) async fn allocate_ids(&self, keys: &[Key]) -> DatastoreResult<Vec<Key>> {
        debug!(backend = "remote", count = keys.len(), "allocate_ids");
        Ok(wrap_keys(self.client.allocate_ids(&native_keys(keys)?).await?))
    }

    #[allow(clippy::unused_self)]
    pub(crate) fn new_query(&self, kind: &str) -> Query {
        Query::for_remote(kind)
    }

    pub(crate) fn run(&self, query: &Query) -> Iter {
        debug!(backend = "remote", kind = query.kind(), "run");
        match query.remote() {
            Ok(q) => Iter::remote(self.client.run(q)),
            Err(_) => Iter::rejected(Backend::Remote),
        }
    }

    pub(crate) fn close(&self) -> DatastoreResult<()> {
        Ok(self.client.close()?)
    }
}

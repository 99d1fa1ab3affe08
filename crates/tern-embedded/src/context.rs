//! Ambient execution context.
//!
//! Every engine call takes a [`Context`]: the KV store holding the app's
//! entities, the app id that scopes them, and an optional deadline applied
//! to each call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EmbeddedError, EmbeddedResult, StorageError};
use crate::kv::{KvStore, MemoryKvStore, validate_namespace};

/// Handle to one app's entities.
#[derive(Clone)]
pub struct Context {
    store: Arc<dyn KvStore>,
    app_id: Arc<str>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("app_id", &self.app_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Bind `app_id` to an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::Storage`] if the app id is empty or
    /// contains control characters.
    pub fn new(store: Arc<dyn KvStore>, app_id: impl Into<String>) -> EmbeddedResult<Self> {
        let app_id = app_id.into();
        validate_namespace(&app_id)?;
        if app_id.chars().any(char::is_control) {
            return Err(StorageError::InvalidKey(
                "app id must not contain control characters".into(),
            )
            .into());
        }
        Ok(Self {
            store,
            app_id: app_id.into(),
            timeout: None,
        })
    }

    /// A context over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::Storage`] if the app id is invalid.
    pub fn in_memory(app_id: impl Into<String>) -> EmbeddedResult<Self> {
        Self::new(Arc::new(MemoryKvStore::new()), app_id)
    }

    /// A context over a persistent `SurrealKV` store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::Storage`] if the store cannot be opened or
    /// the app id is invalid.
    #[cfg(feature = "kv")]
    pub fn open(path: impl AsRef<std::path::Path>, app_id: impl Into<String>) -> EmbeddedResult<Self> {
        let store = crate::kv::SurrealKvStore::open(path)?;
        Self::new(Arc::new(store), app_id)
    }

    /// Copy of this context whose calls fail with
    /// [`EmbeddedError::DeadlineExceeded`] after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    /// The app id scoping this context's entities.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// The per-call deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    /// KV namespace holding entities of `kind`. App ids carry no control
    /// characters, so the first `\u{2}` ends the app id.
    pub(crate) fn kind_namespace(&self, kind: &str) -> String {
        format!("{}\u{2}{kind}", self.app_id)
    }

    /// KV namespace holding engine metadata.
    pub(crate) fn meta_namespace(&self) -> String {
        format!("{}\u{1}meta", self.app_id)
    }

    /// Run `fut` under this context's deadline.
    pub(crate) async fn run<F, T>(&self, fut: F) -> EmbeddedResult<T>
    where
        F: Future<Output = EmbeddedResult<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| EmbeddedError::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_app_id() {
        assert!(Context::in_memory("").is_err());
        assert!(Context::in_memory("a\0b").is_err());
        assert!(Context::in_memory("a\u{2}b").is_err());
    }

    #[test]
    fn test_namespaces_are_app_scoped() {
        let ctx = Context::in_memory("app1").unwrap();
        assert_eq!(ctx.kind_namespace("Task"), "app1\u{2}Task");
        assert_ne!(ctx.meta_namespace(), ctx.kind_namespace("meta"));
    }

    #[test]
    fn test_colons_in_app_and_kind_do_not_collide() {
        let a = Context::in_memory("a").unwrap();
        let ab = Context::in_memory("a:b").unwrap();
        assert_ne!(a.kind_namespace("b:c"), ab.kind_namespace("c"));
    }

    #[tokio::test]
    async fn test_deadline_is_enforced() {
        let ctx = Context::in_memory("app")
            .unwrap()
            .with_timeout(Duration::from_millis(5));
        let res: EmbeddedResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(EmbeddedError::DeadlineExceeded)));
        assert_eq!(ctx.timeout(), Some(Duration::from_millis(5)));
    }
}

//! Query cursor.
//!
//! An [`Iter`] snapshots the matching kind's key list on its first call and
//! then loads entities one at a time. Queries with sort orders must see every
//! candidate before the first result, so they load and sort the candidate set
//! on the first call instead. Once the cursor reports
//! [`EmbeddedError::Done`] it keeps reporting it.

use std::collections::{HashSet, VecDeque};

use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::context::Context;
use crate::datastore::load;
use crate::error::{EmbeddedError, EmbeddedResult};
use crate::key::Key;
use crate::value::project;

enum State {
    Pending,
    Streaming(VecDeque<Key>),
    Sorted(VecDeque<(Key, Json)>),
    Exhausted,
}

/// Cursor over the results of one query run.
pub struct Iter {
    ctx: Context,
    query: crate::query::Query,
    state: State,
    skipped: usize,
    yielded: usize,
    seen: HashSet<String>,
}

impl std::fmt::Debug for Iter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter")
            .field("kind", &self.query.kind())
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}

impl Iter {
    pub(crate) fn new(ctx: Context, query: crate::query::Query) -> Self {
        Self {
            ctx,
            query,
            state: State::Pending,
            skipped: 0,
            yielded: 0,
            seen: HashSet::new(),
        }
    }

    /// Decode the next result.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::Done`] when no results remain, and on every
    /// call after that.
    pub async fn next<T: DeserializeOwned>(&mut self) -> EmbeddedResult<(Key, T)> {
        let (key, entity) = self.advance().await?;
        let entity = entity.unwrap_or_else(|| Json::Object(serde_json::Map::new()));
        Ok((key, serde_json::from_value(entity)?))
    }

    /// Advance and return only the key of the next result.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::Done`] when no results remain.
    pub async fn next_key(&mut self) -> EmbeddedResult<Key> {
        self.advance().await.map(|(key, _)| key)
    }

    async fn advance(&mut self) -> EmbeddedResult<(Key, Option<Json>)> {
        let ctx = self.ctx.clone();
        ctx.run(self.advance_inner()).await
    }

    async fn advance_inner(&mut self) -> EmbeddedResult<(Key, Option<Json>)> {
        if matches!(self.state, State::Pending) {
            self.query.check()?;
            self.state = self.start().await?;
        }
        loop {
            if self.query.limit_value().is_some_and(|l| self.yielded >= l) {
                self.state = State::Exhausted;
            }
            let (key, entity) = match &mut self.state {
                State::Pending | State::Exhausted => return Err(EmbeddedError::Done),
                State::Sorted(rows) => match rows.pop_front() {
                    Some(row) => row,
                    None => {
                        self.state = State::Exhausted;
                        continue;
                    },
                },
                State::Streaming(keys) => {
                    let Some(key) = keys.front().cloned() else {
                        self.state = State::Exhausted;
                        continue;
                    };
                    // Consume the key only once its load has finished, so a
                    // call cut off by the deadline retries it.
                    let loaded = load(&self.ctx, &key).await;
                    keys.pop_front();
                    let entity = match loaded {
                        Ok(entity) => entity,
                        // Deleted since the key list was taken.
                        Err(EmbeddedError::NoSuchEntity) => continue,
                        Err(e) => return Err(e),
                    };
                    if !self.query.matches(&key, &entity) {
                        continue;
                    }
                    (key, entity)
                },
            };
            if let Some(row) = self.accept(key, entity) {
                return Ok(row);
            }
        }
    }

    /// Apply distinct, offset and projection to a matching row.
    fn accept(&mut self, key: Key, entity: Json) -> Option<(Key, Option<Json>)> {
        let projection = self.query.projection();
        let entity = if projection.is_empty() {
            entity
        } else {
            project(&entity, projection)
        };
        if self.query.is_distinct() && !self.seen.insert(entity.to_string()) {
            return None;
        }
        if self.skipped < self.query.offset_value() {
            self.skipped = self.skipped.saturating_add(1);
            return None;
        }
        self.yielded = self.yielded.saturating_add(1);
        let entity = (!self.query.is_keys_only()).then_some(entity);
        Some((key, entity))
    }

    async fn start(&self) -> EmbeddedResult<State> {
        let ns = self.ctx.kind_namespace(self.query.kind());
        let mut keys = Vec::new();
        for raw in self.ctx.store().list_keys(&ns).await? {
            match Key::decode(&raw) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(namespace = %ns, error = %e, "skipping undecodable key"),
            }
        }
        keys.sort();
        debug!(kind = self.query.kind(), candidates = keys.len(), "embedded query start");

        if self.query.orders().is_empty() {
            return Ok(State::Streaming(keys.into()));
        }
        let mut rows = Vec::new();
        for key in keys {
            match load(&self.ctx, &key).await {
                Ok(entity) if self.query.matches(&key, &entity) => rows.push((key, entity)),
                Ok(_) | Err(EmbeddedError::NoSuchEntity) => {},
                Err(e) => return Err(e),
            }
        }
        rows.sort_by(|a, b| self.query.compare_rows((&a.0, &a.1), (&b.0, &b.1)));
        Ok(State::Sorted(rows.into()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::datastore::put;
    use crate::query::Query;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        n: i64,
        group: String,
    }

    async fn seeded(count: i64) -> Context {
        let ctx = Context::in_memory("iter-app").unwrap();
        for n in 1..=count {
            let item = Item {
                n,
                group: if n.rem_euclid(2) == 0 { "even" } else { "odd" }.into(),
            };
            put(&ctx, &Key::new(&ctx, "Item", "", n, None), &item)
                .await
                .unwrap();
        }
        ctx
    }

    #[tokio::test]
    async fn test_exhaustion_is_sticky() {
        let ctx = seeded(2).await;
        let mut it = Query::new("Item").run(&ctx);
        it.next::<Item>().await.unwrap();
        it.next::<Item>().await.unwrap();
        for _ in 0..3 {
            assert!(matches!(it.next::<Item>().await, Err(EmbeddedError::Done)));
        }
    }

    #[tokio::test]
    async fn test_default_order_is_key_order() {
        let ctx = seeded(12).await;
        let (keys, _) = Query::new("Item").get_all::<Item>(&ctx).await.unwrap();
        let ids: Vec<i64> = keys.iter().map(Key::int_id).collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_limit_offset_and_descending_order() {
        let ctx = seeded(10).await;
        let q = Query::new("Item").order("-n").offset(2).limit(3);
        let (_, items) = q.get_all::<Item>(&ctx).await.unwrap();
        let ns: Vec<i64> = items.iter().map(|i| i.n).collect();
        assert_eq!(ns, vec![8, 7, 6]);
    }

    #[tokio::test]
    async fn test_filters_apply_while_streaming() {
        let ctx = seeded(10).await;
        let q = Query::new("Item").filter("group =", "even").filter("n >", 4);
        let (_, items) = q.get_all::<Item>(&ctx).await.unwrap();
        let ns: Vec<i64> = items.iter().map(|i| i.n).collect();
        assert_eq!(ns, vec![6, 8, 10]);
    }

    #[tokio::test]
    async fn test_distinct_projection() {
        let ctx = seeded(6).await;
        let q = Query::new("Item").project(["group"]).distinct();
        let (keys, groups) = q.get_all::<serde_json::Value>(&ctx).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(groups[0]["group"], "odd");
        assert_eq!(groups[1]["group"], "even");
    }

    #[tokio::test]
    async fn test_keys_only() {
        let ctx = seeded(3).await;
        let (keys, values) = Query::new("Item")
            .keys_only()
            .get_all::<Item>(&ctx)
            .await
            .unwrap();
        assert_eq!(keys.len(), 3);
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_ancestor_restricts_to_descendants() {
        let ctx = Context::in_memory("anc-app").unwrap();
        let list_a = Key::new(&ctx, "List", "a", 0, None);
        let list_b = Key::new(&ctx, "List", "b", 0, None);
        for (parent, n) in [(&list_a, 1), (&list_a, 2), (&list_b, 3)] {
            let item = Item {
                n,
                group: "g".into(),
            };
            put(&ctx, &Key::new_incomplete(&ctx, "Item", Some(parent)), &item)
                .await
                .unwrap();
        }
        let (_, items) = Query::new("Item")
            .ancestor(&list_a)
            .get_all::<Item>(&ctx)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_query_fails_every_call() {
        let ctx = seeded(1).await;
        let mut it = Query::new("Item").filter("n <>", 1).run(&ctx);
        assert!(matches!(
            it.next::<Item>().await,
            Err(EmbeddedError::InvalidQuery(_))
        ));
        assert!(matches!(
            it.next::<Item>().await,
            Err(EmbeddedError::InvalidQuery(_))
        ));
    }
}

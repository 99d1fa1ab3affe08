//! Paged query cursor.
//!
//! Results are fetched a page at a time and buffered. Offset and limit are
//! pushed to the database unless the query is distinct, in which case
//! duplicates have to be dropped before rows are counted.

use std::collections::{HashSet, VecDeque};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::client::{Client, Row};
use crate::error::{RemoteError, RemoteResult};
use crate::key::Key;
use crate::query::Query;

/// Iterator over the results of a remote query.
///
/// Once it reports [`RemoteError::Done`] it keeps doing so.
pub struct Iter {
    client: Client,
    query: Query,
    buffer: VecDeque<Row>,
    cursor: usize,
    started: bool,
    drained: bool,
    finished: bool,
    skipped: usize,
    yielded: usize,
    seen: HashSet<String>,
}

impl std::fmt::Debug for Iter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter")
            .field("kind", &self.query.kind())
            .field("cursor", &self.cursor)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Iter {
    pub(crate) fn new(client: Client, query: Query) -> Self {
        Self {
            client,
            query,
            buffer: VecDeque::new(),
            cursor: 0,
            started: false,
            drained: false,
            finished: false,
            skipped: 0,
            yielded: 0,
            seen: HashSet::new(),
        }
    }

    /// Decode the next entity and return it with its key.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Done`] when the results are exhausted.
    pub async fn next<T: DeserializeOwned>(&mut self) -> RemoteResult<(Key, T)> {
        let (key, doc) = self.advance().await?;
        let doc = doc.unwrap_or_else(|| Json::Object(Map::new()));
        Ok((key, serde_json::from_value(doc)?))
    }

    /// Return the next key without decoding its entity.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Done`] when the results are exhausted.
    pub async fn next_key(&mut self) -> RemoteResult<Key> {
        self.advance().await.map(|(key, _)| key)
    }

    async fn advance(&mut self) -> RemoteResult<(Key, Option<Json>)> {
        if self.finished {
            return Err(RemoteError::Done);
        }
        self.query.check()?;
        if !self.started {
            self.started = true;
            if !self.query.is_distinct() {
                self.cursor = self.query.offset_value();
                self.skipped = self.query.offset_value();
            }
        }
        loop {
            if self.query.limit_value().is_some_and(|l| self.yielded >= l) {
                self.finished = true;
                return Err(RemoteError::Done);
            }
            let Some(row) = self.buffer.pop_front() else {
                if self.drained {
                    self.finished = true;
                    return Err(RemoteError::Done);
                }
                self.fill().await?;
                continue;
            };
            let key = Key::from_path(&row.path)?;
            let mut doc: Json = serde_json::from_str(&row.doc)?;
            if !self.query.projection().is_empty() {
                doc = project(&doc, self.query.projection());
            }
            if self.query.is_distinct() && !self.seen.insert(doc.to_string()) {
                continue;
            }
            if self.skipped < self.query.offset_value() {
                self.skipped = self.skipped.saturating_add(1);
                continue;
            }
            self.yielded = self.yielded.saturating_add(1);
            return Ok((key, (!self.query.is_keys_only()).then_some(doc)));
        }
    }

    async fn fill(&mut self) -> RemoteResult<()> {
        let mut page = self.client.page_size();
        if !self.query.is_distinct()
            && let Some(limit) = self.query.limit_value()
        {
            page = page.min(limit.saturating_sub(self.yielded)).max(1);
        }
        let rows = self
            .client
            .fetch(self.query.statement(self.cursor, page))
            .await?;
        if rows.len() < page {
            self.drained = true;
        }
        self.cursor = self.cursor.saturating_add(rows.len());
        self.buffer.extend(rows);
        Ok(())
    }
}

/// Keep only the named (possibly dotted) properties of `doc`.
fn project(doc: &Json, fields: &[String]) -> Json {
    let mut out = Json::Object(Map::new());
    for field in fields {
        let pointer: String = field
            .split('.')
            .map(|p| format!("/{}", p.replace('~', "~0").replace('/', "~1")))
            .collect();
        let Some(value) = doc.pointer(&pointer) else {
            continue;
        };
        let mut slot = &mut out;
        for part in field.split('.') {
            if !slot.is_object() {
                *slot = Json::Object(Map::new());
            }
            slot = match slot {
                Json::Object(map) => map
                    .entry(part.to_owned())
                    .or_insert_with(|| Json::Object(Map::new())),
                other => other,
            };
        }
        *slot = value.clone();
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_project_top_level_and_nested() {
        let doc = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": 4});
        let fields = vec!["a".to_owned(), "b.c".to_owned(), "missing".to_owned()];
        assert_eq!(project(&doc, &fields), json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_project_nothing_matches() {
        let doc = json!({"a": 1});
        assert_eq!(project(&doc, &["z".to_owned()]), json!({}));
    }
}

//! Entity operations: get, put, delete (single and batched) and id
//! allocation.
//!
//! Entities are stored as JSON objects in the KV namespace of their kind,
//! under the key's [encoded](Key::encode) form.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use tracing::debug;

use crate::context::Context;
use crate::error::{EmbeddedError, EmbeddedResult, collect_batch};
use crate::key::Key;

const SEQUENCE_KEY: &str = "sequence";

/// Load and decode the entity stored under `key`.
///
/// # Errors
///
/// Returns [`EmbeddedError::NoSuchEntity`] if nothing is stored under the
/// key, [`EmbeddedError::InvalidKey`] for incomplete or malformed keys.
pub async fn get<T: DeserializeOwned>(ctx: &Context, key: &Key) -> EmbeddedResult<T> {
    let entity = ctx.run(load(ctx, key)).await?;
    Ok(serde_json::from_value(entity)?)
}

/// Load several entities.
///
/// # Errors
///
/// Returns [`EmbeddedError::Multi`] with one slot per key if any key
/// fails.
pub async fn get_multi<T: DeserializeOwned>(ctx: &Context, keys: &[Key]) -> EmbeddedResult<Vec<T>> {
    let mut results = Vec::with_capacity(keys.len());
    for key in keys {
        results.push(get(ctx, key).await);
    }
    collect_batch(results)
}

/// Store `src` under `key`, allocating an id if the key is incomplete.
///
/// Returns the complete key the entity was stored under.
///
/// # Errors
///
/// Returns [`EmbeddedError::InvalidEntity`] if `src` does not serialize to
/// a JSON object.
pub async fn put<T: Serialize + ?Sized>(ctx: &Context, key: &Key, src: &T) -> EmbeddedResult<Key> {
    key.validate(true)?;
    check_app(ctx, key)?;
    let entity = serde_json::to_value(src)?;
    if !entity.is_object() {
        return Err(EmbeddedError::InvalidEntity(format!(
            "entities must be objects, got {entity}"
        )));
    }
    let bytes = serde_json::to_vec(&entity)?;
    ctx.run(async {
        let key = if key.incomplete() {
            let id = next_ids(ctx, 1).await?;
            key.with_int_id(id)
        } else {
            key.clone()
        };
        debug!(key = %key, "embedded put");
        ctx.store()
            .set(&ctx.kind_namespace(key.kind()), &key.encode(), bytes)
            .await?;
        Ok(key)
    })
    .await
}

/// Store several entities; result keys line up with the inputs.
///
/// # Errors
///
/// Returns [`EmbeddedError::LengthMismatch`] if the slices differ in
/// length, or [`EmbeddedError::Multi`] if any element fails.
pub async fn put_multi<T: Serialize>(ctx: &Context, keys: &[Key], src: &[T]) -> EmbeddedResult<Vec<Key>> {
    if keys.len() != src.len() {
        return Err(EmbeddedError::LengthMismatch {
            keys: keys.len(),
            values: src.len(),
        });
    }
    let mut results = Vec::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(src) {
        results.push(put(ctx, key, value).await);
    }
    collect_batch(results)
}

/// Delete the entity under `key`. Deleting a missing entity succeeds.
///
/// # Errors
///
/// Returns [`EmbeddedError::InvalidKey`] for incomplete or malformed keys.
pub async fn delete(ctx: &Context, key: &Key) -> EmbeddedResult<()> {
    key.validate(false)?;
    check_app(ctx, key)?;
    ctx.run(async {
        let existed = ctx
            .store()
            .delete(&ctx.kind_namespace(key.kind()), &key.encode())
            .await?;
        debug!(key = %key, existed, "embedded delete");
        Ok(())
    })
    .await
}

/// Delete several entities.
///
/// # Errors
///
/// Returns [`EmbeddedError::Multi`] if any key fails.
pub async fn delete_multi(ctx: &Context, keys: &[Key]) -> EmbeddedResult<()> {
    let mut results = Vec::with_capacity(keys.len());
    for key in keys {
        results.push(delete(ctx, key).await);
    }
    collect_batch(results).map(|_| ())
}

/// Reserve ids for incomplete keys without writing entities.
///
/// # Errors
///
/// Returns [`EmbeddedError::InvalidKey`] if any key is already complete.
pub async fn allocate_ids(ctx: &Context, keys: &[Key]) -> EmbeddedResult<Vec<Key>> {
    for key in keys {
        key.validate(true)?;
        check_app(ctx, key)?;
        if !key.incomplete() {
            return Err(EmbeddedError::InvalidKey(format!(
                "cannot allocate an id for complete key {key}"
            )));
        }
    }
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let count = i64::try_from(keys.len())
        .map_err(|_| EmbeddedError::InvalidKey("too many keys".into()))?;
    let first = ctx.run(next_ids(ctx, count)).await?;
    keys.iter()
        .zip(0..count)
        .map(|(key, i)| {
            first
                .checked_add(i)
                .map(|id| key.with_int_id(id))
                .ok_or_else(|| EmbeddedError::InvalidKey("id space exhausted".into()))
        })
        .collect()
}

pub(crate) async fn load(ctx: &Context, key: &Key) -> EmbeddedResult<Json> {
    key.validate(false)?;
    check_app(ctx, key)?;
    let bytes = ctx
        .store()
        .get(&ctx.kind_namespace(key.kind()), &key.encode())
        .await?
        .ok_or(EmbeddedError::NoSuchEntity)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn check_app(ctx: &Context, key: &Key) -> EmbeddedResult<()> {
    if key.app_id() == ctx.app_id() {
        Ok(())
    } else {
        Err(EmbeddedError::InvalidKey(format!(
            "key belongs to app {}, context to {}",
            key.app_id(),
            ctx.app_id()
        )))
    }
}

/// Reserve `count` consecutive ids and return the first.
async fn next_ids(ctx: &Context, count: i64) -> EmbeddedResult<i64> {
    let last = ctx
        .store()
        .increment(&ctx.meta_namespace(), SEQUENCE_KEY, count)
        .await?;
    let first = last
        .checked_sub(count)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| EmbeddedError::InvalidKey("id space exhausted".into()))?;
    debug!(app = ctx.app_id(), first, last, "allocated ids");
    Ok(first)
}

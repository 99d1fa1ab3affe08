//! Tern Embedded: an in-process entity engine.
//!
//! Stores schemaless entities (JSON objects) under hierarchical [`Key`]s
//! and answers [`Query`]s over one kind at a time. Everything runs inside
//! the calling process on top of a raw [`KvStore`]:
//!
//! | Store | Availability | Use |
//! |-------|--------------|-----|
//! | [`MemoryKvStore`] | always | tests, ephemeral apps |
//! | `SurrealKvStore` | `kv` feature | persistent apps |
//!
//! Every call takes a [`Context`], which names the app whose entities it
//! touches and carries an optional deadline.
//!
//! ```rust,ignore
//! use tern_embedded::{Context, Key, Query, datastore};
//!
//! let ctx = Context::in_memory("my-app")?;
//! let key = datastore::put(&ctx, &Key::new_incomplete(&ctx, "Task", None), &task).await?;
//! let mut it = Query::new("Task").filter("done =", false).run(&ctx);
//! while let Ok((key, task)) = it.next::<Task>().await { /* ... */ }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod datastore;
pub mod error;
pub mod kv;

mod context;
mod iter;
mod key;
mod query;
mod value;

pub use context::Context;
pub use error::{EmbeddedError, EmbeddedResult, MultiError, StorageError, StorageResult};
pub use iter::Iter;
pub use key::Key;
pub use kv::{KvStore, MemoryKvStore};
pub use query::{Direction, Filter, KEY_PROPERTY, Operator, Order, Query};
pub use value::Value;

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;

//! Tern Remote: entity storage in a `SurrealDB` database.
//!
//! Each entity kind maps to a table; each [`Key`] maps to one record whose
//! id is the key's [path](Key::path). A [`Client`] is bound to one project,
//! which selects the database inside the configured namespace.
//!
//! # Connection Strings
//!
//! | Mode | Endpoint |
//! |------|----------|
//! | Server | `ws://host:8000`, `http://host:8000` |
//! | In-process (tests) | `mem://` |
//!
//! ```rust,ignore
//! use tern_remote::{Client, Key, Query, Settings};
//!
//! let client = Client::connect("my-project", &Settings::default()).await?;
//! let key = client.put(&Key::incomplete_key("Task", None), &task).await?;
//! let (keys, tasks) = client.get_all::<Task>(&Query::new("Task").limit(10)).await?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;

mod client;
mod iter;
mod key;
mod query;

pub use client::{Client, DEFAULT_ENDPOINT, DEFAULT_NAMESPACE, DEFAULT_PAGE_SIZE, Settings};
pub use error::{MultiError, RemoteError, RemoteResult};
pub use iter::Iter;
pub use key::Key;
pub use query::{KEY_FIELD, Query, Value};

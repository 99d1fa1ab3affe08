//! Tern Datastore: one API over the remote and embedded entity stores.
//!
//! Application code builds a [`Client`] for one backend and then works
//! only with [`Key`], [`Query`] and [`Iter`]. Every call is routed to that
//! backend; its errors come back unchanged, except that running out of
//! query results is always [`DatastoreError::Done`].
//!
//! | Backend | Built with | Scoped by |
//! |---------|------------|-----------|
//! | Remote | [`Client::remote`], [`Client::connect_remote`] | project id |
//! | Embedded | [`Client::embedded`] | app id of the [`Context`] |
//!
//! [`Client::from_config`] picks the backend from a loaded
//! [`tern_config::Config`].
//!
//! ```rust,ignore
//! use tern_datastore::{Client, Context};
//!
//! let client = Client::embedded(Context::in_memory("notes")?);
//! let key = client.put(&client.incomplete_key("Task", None)?, &task).await?;
//! let mut it = client.run(&client.new_query("Task").filter("done", false).limit(5));
//! loop {
//!     match it.next::<Task>().await {
//!         Ok((key, task)) => println!("{key}: {}", task.title),
//!         Err(e) if e.is_done() => break,
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;

mod client;
mod embedded;
mod iter;
mod key;
mod query;
mod remote;

pub use client::Client;
pub use error::{DatastoreError, DatastoreResult};
pub use iter::Iter;
pub use key::Key;
pub use query::{KEY_FIELD, Query, Value};

pub use tern_config::Backend;
pub use tern_embedded::Context;
pub use tern_remote::Settings;

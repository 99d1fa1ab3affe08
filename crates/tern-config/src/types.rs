//! Configuration types.
//!
//! Every struct implements [`Default`] with the same values as
//! `defaults.toml`, so a bare `[section]` header yields a working
//! configuration.

use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which backend to use and how to reach it.
    pub store: StoreSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// StoreSection
// ---------------------------------------------------------------------------

/// Backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Remote database server.
    Remote,
    /// In-process engine.
    #[default]
    Embedded,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::Embedded => "embedded",
        })
    }
}

/// Store settings for both backends; only the selected one is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Backend used by `Client::from_config`.
    pub backend: Backend,
    /// Remote backend settings.
    pub remote: RemoteSection,
    /// Embedded backend settings.
    pub embedded: EmbeddedSection,
}

// ---------------------------------------------------------------------------
// RemoteSection
// ---------------------------------------------------------------------------

/// Remote backend connection settings.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Database endpoint (`ws://`, `http://`, or `mem://`).
    pub endpoint: String,
    /// Project the client is bound to. Required for the remote backend.
    pub project_id: String,
    /// Database namespace holding the project databases.
    pub namespace: String,
    /// Rows fetched per round trip while iterating.
    pub page_size: usize,
    /// Root user name.
    pub username: Option<String>,
    /// Root password. Prefer `TERN_REMOTE_PASSWORD` over storing it in a file.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".to_owned(),
            project_id: String::new(),
            namespace: "tern".to_owned(),
            page_size: 100,
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for RemoteSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSection")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .field("namespace", &self.namespace)
            .field("page_size", &self.page_size)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

impl Serialize for RemoteSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RemoteSection", 5)?;
        state.serialize_field("endpoint", &self.endpoint)?;
        state.serialize_field("project_id", &self.project_id)?;
        state.serialize_field("namespace", &self.namespace)?;
        state.serialize_field("page_size", &self.page_size)?;
        state.serialize_field("username", &self.username)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// EmbeddedSection
// ---------------------------------------------------------------------------

/// Embedded backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedSection {
    /// App whose entities the client reads and writes.
    pub app_id: String,
    /// Directory of the persistent store. Empty means in-memory.
    pub path: PathBuf,
    /// Per-call deadline in seconds. 0 disables it.
    pub timeout_secs: u64,
}

impl Default for EmbeddedSection {
    fn default() -> Self {
        Self {
            app_id: "tern".to_owned(),
            path: PathBuf::new(),
            timeout_secs: 0,
        }
    }
}

impl EmbeddedSection {
    /// Whether entities live only in memory.
    #[must_use]
    pub fn in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tern_remote=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}

//! Tern Telemetry: logging setup for Tern stores.
//!
//! Installs a global `tracing` subscriber with a level filter, per-crate
//! directives, and a choice of output format and target.
//!
//! # Example
//!
//! ```rust,no_run
//! use tern_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), tern_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("tern_remote=trace");
//! setup_logging(&config)?;
//! tracing::info!("store starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};

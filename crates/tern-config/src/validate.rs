//! Post-load configuration validation.
//!
//! Checks that deserialized [`Config`](crate::Config) values are in range
//! and that the selected backend has what it needs to connect.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Backend, Config};

/// Largest accepted remote page size.
const MAX_PAGE_SIZE: usize = 10_000;

/// Validate a fully-merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_store(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_store(config: &Config) -> ConfigResult<()> {
    let remote = &config.store.remote;
    if remote.page_size == 0 || remote.page_size > MAX_PAGE_SIZE {
        return Err(invalid(
            "store.remote.page_size",
            format!("page_size must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    if remote.username.is_some() != remote.password.is_some() {
        return Err(invalid(
            "store.remote.username",
            "username and password must be set together",
        ));
    }

    let embedded = &config.store.embedded;
    if embedded.app_id.chars().any(char::is_control) {
        return Err(invalid(
            "store.embedded.app_id",
            "app_id contains a control character",
        ));
    }

    match config.store.backend {
        Backend::Remote => {
            if remote.endpoint.trim().is_empty() {
                return Err(invalid("store.remote.endpoint", "endpoint is required"));
            }
            if remote.project_id.trim().is_empty() {
                return Err(invalid(
                    "store.remote.project_id",
                    "project_id is required for the remote backend",
                ));
            }
        },
        Backend::Embedded => {
            if embedded.app_id.trim().is_empty() {
                return Err(invalid(
                    "store.embedded.app_id",
                    "app_id is required for the embedded backend",
                ));
            }
        },
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_remote_requires_project() {
        let mut config = Config::default();
        config.store.backend = Backend::Remote;
        assert_eq!(field_of(validate(&config)), "store.remote.project_id");
        config.store.remote.project_id = "proj".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_embedded_requires_app_id() {
        let mut config = Config::default();
        config.store.embedded.app_id = " ".into();
        assert_eq!(field_of(validate(&config)), "store.embedded.app_id");
        config.store.embedded.app_id = "a\u{2}b".into();
        assert_eq!(field_of(validate(&config)), "store.embedded.app_id");
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = Config::default();
        config.store.remote.page_size = 0;
        assert_eq!(field_of(validate(&config)), "store.remote.page_size");
        config.store.remote.page_size = 10_001;
        assert_eq!(field_of(validate(&config)), "store.remote.page_size");
    }

    #[test]
    fn test_credentials_come_in_pairs() {
        let mut config = Config::default();
        config.store.remote.username = Some("root".into());
        assert_eq!(field_of(validate(&config)), "store.remote.username");
    }

    #[test]
    fn test_invalid_logging() {
        let mut config = Config::default();
        config.logging.level = "loud".into();
        assert_eq!(field_of(validate(&config)), "logging.level");
        config.logging.level = "warn".into();
        config.logging.format = "xml".into();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }
}

//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.tern/config.toml` (user)
//! 3. Merge `{workspace}/.tern/config.toml` (workspace)
//! 4. Apply env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the configuration with layered file precedence.
///
/// `workspace_root` is the root of the current project. If `None`, the
/// workspace layer is skipped. `home_override` replaces the user's home
/// directory when looking for the user layer.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(workspace_root: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut file_fields = HashSet::new();

    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };
    let mut layers = vec![home.join(".tern").join("config.toml")];
    if let Some(root) = workspace_root {
        layers.push(root.join(".tern").join("config.toml"));
    }
    for path in layers {
        if let Some(overlay) = try_load_file(&path)? {
            merge_tracking(&mut merged, &overlay, "", &mut file_fields);
            info!(path = %path.display(), "loaded config file");
        }
    }

    let applied = apply_env_fallbacks(&mut merged, &file_fields, &collect_env_vars());
    if applied > 0 {
        debug!(count = applied, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path (no layering, no env).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = overlay
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Parse and validate a config held in memory.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the text is not valid TOML for [`Config`]
/// or fails validation.
pub fn from_toml_str(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Deep-merge `overlay` into `base`, recording every leaf path it sets.
fn merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    fields: &mut HashSet<String>,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match base_table.get_mut(key) {
                    Some(base_val) => merge_tracking(base_val, overlay_val, &path, fields),
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        record_leaves(overlay_val, &path, fields);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            fields.insert(prefix.to_owned());
        },
    }
}

fn record_leaves(val: &toml::Value, prefix: &str, fields: &mut HashSet<String>) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &format!("{prefix}.{key}"), fields);
        }
    } else {
        fields.insert(prefix.to_owned());
    }
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Backend;

    #[test]
    fn test_defaults_deserialize_to_default_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_try_load_file_missing() {
        let result = try_load_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_file_partial_sections_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store.embedded]\napp_id = \"notes\"\n").unwrap();
        let config = load_file(&path).unwrap();
        assert_eq!(config.store.embedded.app_id, "notes");
        assert_eq!(config.store.backend, Backend::Embedded);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_merge_tracking_records_leaves() {
        let mut base: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        let overlay: toml::Value =
            toml::from_str("[store]\nbackend = \"remote\"\n[extra]\nx = 1").unwrap();
        let mut fields = HashSet::new();
        merge_tracking(&mut base, &overlay, "", &mut fields);
        assert!(fields.contains("store.backend"));
        assert!(fields.contains("extra.x"));
        assert!(!fields.contains("store.remote.endpoint"));
        assert_eq!(base["store"]["backend"].as_str(), Some("remote"));
    }

    #[test]
    fn test_layers_workspace_over_user() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".tern")).unwrap();
        std::fs::create_dir_all(ws.path().join(".tern")).unwrap();
        std::fs::write(
            home.path().join(".tern/config.toml"),
            "[store.embedded]\napp_id = \"user-app\"\ntimeout_secs = 5\n",
        )
        .unwrap();
        std::fs::write(
            ws.path().join(".tern/config.toml"),
            "[store.embedded]\napp_id = \"ws-app\"\n",
        )
        .unwrap();
        let config = load(Some(ws.path()), Some(home.path())).unwrap();
        assert_eq!(config.store.embedded.app_id, "ws-app");
        assert_eq!(config.store.embedded.timeout_secs, 5);
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.toml");
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        std::fs::write(&file_path, data).unwrap();
        let result = try_load_file(&file_path);
        assert!(
            matches!(result, Err(ConfigError::ValidationError { .. })),
            "Expected ValidationError for oversized config, got: {result:?}"
        );
    }

    #[test]
    fn test_from_toml_str_validates() {
        let err = from_toml_str("[store]\nbackend = \"remote\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }
}

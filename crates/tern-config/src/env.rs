//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only fill fields that no
//! config file set.

use std::collections::{HashMap, HashSet};

use tracing::debug;

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TERN_BACKEND",
        field_path: "store.backend",
    },
    EnvMapping {
        var_name: "TERN_REMOTE_ENDPOINT",
        field_path: "store.remote.endpoint",
    },
    EnvMapping {
        var_name: "TERN_PROJECT_ID",
        field_path: "store.remote.project_id",
    },
    EnvMapping {
        var_name: "TERN_REMOTE_NAMESPACE",
        field_path: "store.remote.namespace",
    },
    EnvMapping {
        var_name: "TERN_REMOTE_PAGE_SIZE",
        field_path: "store.remote.page_size",
    },
    EnvMapping {
        var_name: "TERN_REMOTE_USERNAME",
        field_path: "store.remote.username",
    },
    EnvMapping {
        var_name: "TERN_REMOTE_PASSWORD",
        field_path: "store.remote.password",
    },
    EnvMapping {
        var_name: "TERN_APP_ID",
        field_path: "store.embedded.app_id",
    },
    EnvMapping {
        var_name: "TERN_EMBEDDED_PATH",
        field_path: "store.embedded.path",
    },
    EnvMapping {
        var_name: "TERN_EMBEDDED_TIMEOUT_SECS",
        field_path: "store.embedded.timeout_secs",
    },
    EnvMapping {
        var_name: "TERN_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "TERN_LOG_FORMAT",
        field_path: "logging.format",
    },
];

/// Apply env fallbacks to every mapped field not listed in `file_fields`.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    file_fields: &HashSet<String>,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        if file_fields.contains(mapping.field_path) {
            continue;
        }
        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );
            set_field(merged, mapping.field_path, coerce(mapping.field_path, val));
            count = count.saturating_add(1);
        }
    }
    count
}

/// Set a dotted field, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

fn coerce(path: &str, val: &str) -> toml::Value {
    if matches!(
        path,
        "store.remote.page_size" | "store.embedded.timeout_secs"
    ) && let Ok(i) = val.parse::<i64>()
    {
        return toml::Value::Integer(i);
    }
    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_fallback_fills_unset_fields() {
        let mut merged: toml::Value = toml::from_str("[store]\nbackend = \"embedded\"").unwrap();
        let env = make_env(&[("TERN_PROJECT_ID", "proj"), ("TERN_REMOTE_PAGE_SIZE", "25")]);
        let applied = apply_env_fallbacks(&mut merged, &HashSet::new(), &env);
        assert_eq!(applied, 2);
        assert_eq!(merged["store"]["remote"]["project_id"].as_str(), Some("proj"));
        assert_eq!(merged["store"]["remote"]["page_size"].as_integer(), Some(25));
    }

    #[test]
    fn test_file_fields_win_over_env() {
        let mut merged: toml::Value = toml::from_str("[store]\nbackend = \"embedded\"").unwrap();
        let file_fields: HashSet<String> = ["store.backend".to_owned()].into();
        let env = make_env(&[("TERN_BACKEND", "remote")]);
        let applied = apply_env_fallbacks(&mut merged, &file_fields, &env);
        assert_eq!(applied, 0);
        assert_eq!(merged["store"]["backend"].as_str(), Some("embedded"));
    }

    #[test]
    fn test_non_numeric_stays_string() {
        assert_eq!(
            coerce("store.remote.page_size", "lots"),
            toml::Value::String("lots".into())
        );
    }
}

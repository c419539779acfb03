//! `KEEL_*` environment variable overrides.
//!
//! Env vars are applied after the config file, so they override it.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Prefix of every recognised variable.
pub const ENV_PREFIX: &str = "KEEL_";

#[derive(Clone, Copy)]
enum ValueKind {
    Integer,
    String,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: ValueKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "KEEL_CALL_TIMEOUT_MS",
        field_path: "execution.call_timeout_ms",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KEEL_INIT_TIMEOUT_MS",
        field_path: "execution.init_timeout_ms",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KEEL_SANDBOX_MEMORY_LIMIT_BYTES",
        field_path: "sandbox.memory_limit_bytes",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KEEL_SANDBOX_MAX_STACK_SIZE_BYTES",
        field_path: "sandbox.max_stack_size_bytes",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KEEL_EVENTS_CHANNEL_CAPACITY",
        field_path: "events.channel_capacity",
        kind: ValueKind::Integer,
    },
    EnvMapping {
        var_name: "KEEL_LOG_LEVEL",
        field_path: "logging.level",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "KEEL_LOG_FORMAT",
        field_path: "logging.format",
        kind: ValueKind::String,
    },
    EnvMapping {
        var_name: "KEEL_LOG_CONSOLE_LEVEL",
        field_path: "logging.console_level",
        kind: ValueKind::String,
    },
];

/// Apply every set `KEEL_*` variable to the merged tree.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::Env`] if a numeric variable does not parse.
pub fn apply_env_overrides<S: BuildHasher>(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };
        let value = match mapping.kind {
            ValueKind::Integer => {
                let parsed = raw.trim().parse::<i64>().map_err(|e| ConfigError::Env {
                    var: mapping.var_name.to_owned(),
                    message: format!("expected an integer: {e}"),
                })?;
                toml::Value::Integer(parsed)
            },
            ValueKind::String => toml::Value::String(raw.clone()),
        };
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        set_field(merged, mapping.field_path, value);
        count = count.saturating_add(1);
    }
    Ok(count)
}

/// Snapshot of the process environment, restricted to [`ENV_PREFIX`].
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect()
}

/// Set `section.key` in `root`, creating the section if needed.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let Some((section, key)) = path.split_once('.') else {
        return;
    };
    let Some(root) = root.as_table_mut() else {
        return;
    };
    let section = root
        .entry(section.to_owned())
        .or_insert(toml::Value::Table(toml::map::Map::new()));
    if let Some(table) = section.as_table_mut() {
        table.insert(key.to_owned(), value);
    }
}

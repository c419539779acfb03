//! Config file loading.
//!
//! `load` runs these steps:
//! 1. Parse the embedded `defaults.toml` as the base
//! 2. Merge the optional config file over it
//! 3. Apply `KEEL_*` environment variable overrides
//! 4. Deserialize the merged tree into [`Config`]
//! 5. Validate

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load configuration from defaults, an optional file and the process
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, an env
/// var is malformed, or the result fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    load_with_env(path, &collect_env_vars())
}

/// Like [`load`], with an explicit environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: BuildHasher>(
    path: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::Parse {
            origin: "<defaults>".to_owned(),
            source: e,
        })?;

    if let Some(path) = path {
        let overlay = read_file(path)?;
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded config file");
    }

    let applied = apply_env_overrides(&mut merged, env_vars)?;
    if applied > 0 {
        debug!(count = applied, "applied environment variable overrides");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                origin: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a single file over the defaults, ignoring the
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    load_with_env(Some(path), &HashMap::new())
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        origin: path.display().to_string(),
        source: e,
    })
}

/// Recursively merge `overlay` into `base`. Tables merge key by key; any
/// other value in `overlay` replaces the one in `base`.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    },
                }
            }
        },
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn write(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("keel.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_default_impl() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_without_file() {
        let config = load_with_env(None, &no_env()).unwrap();
        assert_eq!(config.execution.call_timeout_ms, 60_000);
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
            [execution]
            call_timeout_ms = 500

            [logging]
            directives = ["keel_sandbox=debug"]
            "#,
        );

        let config = load_with_env(Some(&path), &no_env()).unwrap();
        assert_eq!(config.execution.call_timeout_ms, 500);
        // Untouched keys keep their defaults.
        assert_eq!(config.execution.init_timeout_ms, 60_000);
        assert_eq!(config.logging.directives, vec!["keel_sandbox=debug"]);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[logging]\nlevel = \"warn\"\n");
        let env: HashMap<String, String> = [("KEEL_LOG_LEVEL".to_owned(), "trace".to_owned())]
            .into_iter()
            .collect();

        let config = load_with_env(Some(&path), &env).unwrap();
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_invalid_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[events]\nchannel_capacity = 0\n");
        assert!(matches!(
            load_file(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[execution\n");
        assert!(matches!(load_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = load_file(Path::new("/nonexistent/keel.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_oversized_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = "x = \"".to_owned() + &"a".repeat(1_100_000) + "\"";
        let path = write(&dir, &data);
        assert!(matches!(
            load_file(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let mut base: toml::Value = toml::from_str("a = [1, 2]\n[t]\nx = 1\ny = 2").unwrap();
        let overlay: toml::Value = toml::from_str("a = [3]\n[t]\ny = 5").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["a"].as_array().unwrap().len(), 1);
        assert_eq!(base["t"]["x"].as_integer(), Some(1));
        assert_eq!(base["t"]["y"].as_integer(), Some(5));
    }
}

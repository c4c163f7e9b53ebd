//! Locating gdbind.toml and layering `GDBIND_*` variables over it.
//!
//! Loading never fails: a missing, unreadable or malformed file leaves the
//! compiled-in defaults in place and logs why.

use crate::BindingConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "GDBIND_CONFIG";

/// Relative paths tried, in order, when `GDBIND_CONFIG` is unset or missing
///
/// The second entry finds the workspace file from inside `inspect/`.
pub const CONFIG_SEARCH_PATHS: &[&str] = &["gdbind.toml", "../gdbind.toml"];

/// Resolve the binding settings for this process
///
/// `GDBIND_CONFIG` names the file if set and present; otherwise the first
/// existing entry of [`CONFIG_SEARCH_PATHS`] is used. Env overrides apply on
/// every path, including the no-file one.
pub fn load_config() -> BindingConfig {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from {}: {}", CONFIG_ENV_VAR, path.display());
            return load_from_path(&path);
        }
        warn!(
            "{}={} not found, searching defaults",
            CONFIG_ENV_VAR,
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(path);
        }
    }

    debug!("No gdbind.toml found, using built-in defaults");
    apply_env_overrides(BindingConfig::default())
}

/// Read one gdbind.toml, then apply env overrides
pub fn load_from_path(path: &Path) -> BindingConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(BindingConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(BindingConfig::default())
        }
    }
}

// One `GDBIND_*` variable onto one field. The `parse` form skips values
// that do not parse, with a warning, instead of failing the load.
macro_rules! env_override {
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        match std::env::var($key).map(|s| s.parse()) {
            Ok(Ok(v)) => $config.$section.$field = v,
            Ok(Err(_)) => warn!("Ignoring unparseable {}", $key),
            Err(_) => {}
        }
    };
}

/// Overwrite fields of `config` from `GDBIND_<SECTION>_<KEY>` variables
pub fn apply_env_overrides(mut config: BindingConfig) -> BindingConfig {
    // Common
    env_override!(config, common.log_level, "GDBIND_COMMON_LOG_LEVEL");

    // Runtime
    env_override!(
        config,
        runtime.frame_pool_limit,
        "GDBIND_RUNTIME_FRAME_POOL_LIMIT",
        parse
    );
    env_override!(
        config,
        runtime.allow_class_override,
        "GDBIND_RUNTIME_ALLOW_CLASS_OVERRIDE",
        parse
    );

    // Inspect
    env_override!(config, inspect.json, "GDBIND_INSPECT_JSON", parse);

    config
}

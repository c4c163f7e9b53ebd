//! Compiled-in fallback values for every `BindingConfig` field.
//!
//! config.defaults.toml at the workspace root is the single source; serde
//! default functions in `structs` read from here.

use once_cell::sync::Lazy;
use serde::Deserialize;

const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    runtime: RuntimeDefaults,
    inspect: InspectDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeDefaults {
    frame_pool_limit: usize,
    allow_class_override: bool,
}

#[derive(Debug, Deserialize)]
struct InspectDefaults {
    json: bool,
}

// Common
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}

// Runtime
pub fn frame_pool_limit() -> usize {
    DEFAULTS.runtime.frame_pool_limit
}
pub fn allow_class_override() -> bool {
    DEFAULTS.runtime.allow_class_override
}

// Inspect
pub fn json() -> bool {
    DEFAULTS.inspect.json
}

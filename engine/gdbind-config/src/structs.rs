//! The gdbind.toml schema. Absent tables and keys take their defaults.

use crate::defaults;
use serde::Deserialize;

fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_frame_pool_limit() -> usize {
    defaults::frame_pool_limit()
}
fn d_allow_class_override() -> bool {
    defaults::allow_class_override()
}
fn d_json() -> bool {
    defaults::json()
}

/// Parsed gdbind.toml
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct BindingConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub inspect: InspectConfig,
}

/// `[common]`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CommonConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level().into(),
        }
    }
}

/// `[runtime]`: frame pooling and class registration
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Idle call-frame buffers kept per thread
    #[serde(default = "d_frame_pool_limit")]
    pub frame_pool_limit: usize,
    /// Replace an existing class on duplicate registration instead of failing
    #[serde(default = "d_allow_class_override")]
    pub allow_class_override: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_pool_limit: defaults::frame_pool_limit(),
            allow_class_override: defaults::allow_class_override(),
        }
    }
}

/// `[inspect]`: gdbind-inspect output
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct InspectConfig {
    #[serde(default = "d_json")]
    pub json: bool,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            json: defaults::json(),
        }
    }
}

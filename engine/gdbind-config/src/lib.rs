//! Settings for the binding layer and the inspector.
//!
//! A [`BindingConfig`] sizes the per-thread call-frame pool and decides
//! whether a class may be registered over an existing one. The inspector
//! reads its log level and output format from it too. Every field has a value in
//! config.defaults.toml, which is compiled in; a gdbind.toml only lists the
//! fields it changes.
//!
//! A `GDBIND_<SECTION>_<KEY>` variable beats the file, which beats the
//! compiled-in default:
//!
//! ```text
//! GDBIND_COMMON_LOG_LEVEL=debug
//! GDBIND_RUNTIME_FRAME_POOL_LIMIT=64
//! GDBIND_RUNTIME_ALLOW_CLASS_OVERRIDE=true
//! GDBIND_INSPECT_JSON=true
//! ```

mod defaults;
mod loader;
mod structs;

pub use defaults::*;
pub use loader::{
    apply_env_overrides, load_config, load_from_path, CONFIG_ENV_VAR, CONFIG_SEARCH_PATHS,
};
pub use structs::*;

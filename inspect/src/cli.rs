//! Command-line interface for the inspector
//!
//! Defaults come from gdbind.toml (with `GDBIND_*` environment overrides);
//! flags given on the command line take priority.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use gdbind_config::{load_config, BindingConfig};
use once_cell::sync::Lazy;
use tracing::level_filters::LevelFilter;

// Load config once at startup
static CONFIG: Lazy<BindingConfig> = Lazy::new(load_config);

fn default_log_level() -> String {
    CONFIG.common.log_level.clone()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "gdbind-inspect")]
#[command(about = "Inspect engine class bindings against the local runtime")]
#[command(
    long_about = "Boots the in-process engine runtime, registers the bound classes, and
inspects the class database: ancestor chains, construction by name, and
virtual method resolution.

Configuration is loaded from gdbind.toml with environment variable overrides.
CLI arguments take highest priority."
)]
pub struct Cli {
    /// Tracing filter when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value_t = default_log_level())]
    pub log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List every registered class
    Classes,
    /// Print the ancestor chain of a class
    Chain { class: String },
    /// Construct a class by name and up-cast it along its chain
    Construct { class: String },
    /// Show which class level implements a virtual method
    Resolve { class: String, method: String },
    /// Run a scripted extension class for a number of frames
    Demo {
        /// Frames to simulate
        #[arg(long, default_value_t = 60)]
        frames: u32,
    },
}

impl Cli {
    pub fn validate(&self) -> Result<()> {
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }
        if let Command::Demo { frames: 0 } = self.command {
            return Err(anyhow!("demo needs at least one frame"));
        }
        Ok(())
    }

    /// JSON output if requested on the command line or in the config file
    pub fn json_output(&self) -> bool {
        self.json || CONFIG.inspect.json
    }
}

/// The loaded configuration
pub fn config() -> &'static BindingConfig {
    &CONFIG
}

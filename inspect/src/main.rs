//! gdbind-inspect - drive the engine bindings from the command line
//!
//! Boots the in-process runtime, registers the bound engine classes, and then:
//! 1. Lists the class database (`classes`)
//! 2. Walks a class's ancestor chain (`chain`)
//! 3. Constructs a class by name and releases it again (`construct`)
//! 4. Shows where a virtual method resolves (`resolve`)
//! 5. Runs a host-defined `Player` class through the frame loop (`demo`)

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod commands;
mod demo;

use crate::cli::{Cli, Command};

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    init_tracing(&cli.log_level)?;
    info!(log_level = %cli.log_level, "Tracing initialized");

    let rt = commands::boot(cli::config())?;
    let json = cli.json_output();

    match &cli.command {
        Command::Classes => commands::emit(&commands::classes(), json)?,
        Command::Chain { class } => commands::emit(&commands::chain(class)?, json)?,
        Command::Construct { class } => {
            commands::emit(&commands::construct(&rt, class)?, json)?
        }
        Command::Resolve { class, method } => {
            commands::emit(&commands::resolve(class, method)?, json)?
        }
        Command::Demo { frames } => commands::emit(&demo::run_demo(&rt, *frames)?, json)?,
    }

    Ok(())
}

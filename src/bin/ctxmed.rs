//! ctxmed CLI Binary
//!
//! Command-line interface for signing, verifying and inspecting marshaled context.

use clap::Parser;
use context_mediator::cli::{map_error, Cli, RunContext};
use context_mediator::config::ConfigLoader;
use context_mediator::error::ContextError;
use context_mediator::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{debug, error};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(Some(&build_logging_config(&cli))) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    match run(&cli) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!(error = %e, "ctxmed failed");
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<String, ContextError> {
    debug!(workspace = %cli.workspace.display(), "ctxmed starting");
    RunContext::new(cli.workspace.clone(), cli.config.clone())?.execute(&cli.command)
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if cli.quiet {
        config.level = "off".to_string();
    }

    config
}

//! CLI parse: clap types for ctxmed. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::output::OutputFormat;

/// ctxmed - sign, verify and inspect marshaled shared context
#[derive(Parser)]
#[command(name = "ctxmed")]
#[command(about = "Sign, verify and inspect marshaled shared context")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (holds config/)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Suppress logging
    #[arg(long, short)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stamp and sign a name=value context file
    Sign {
        file: PathBuf,
        /// Write the signed body here and print only the signature
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Verify a signed context file and print its items
    Verify {
        file: PathBuf,
        /// Hex signature produced by `sign`
        #[arg(long)]
        signature: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the items of a context file, sorted by name
    Show {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the effective configuration as TOML
    Config,
}

//! CLI command definitions for layerconf
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::format::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Resolve layered configuration from local files, remote stores and secrets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project root searched for the config directory
    #[arg(short, long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Config directory (overrides CONFIG_PATH)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Environment name (overrides CONFIG_ENV)
    #[arg(short = 'e', long, global = true)]
    pub config_env: Option<String>,

    /// Expand ${VAR} references in loaded files
    #[arg(long, global = true)]
    pub interpolate: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Process arguments, passed after `--`.
#[derive(Args, Debug, Default, Clone)]
pub struct ProcessArgsOpt {
    /// NAME=value pairs read by the `process` resolver and settings
    #[arg(last = true, value_name = "NAME=VALUE")]
    pub process_args: Vec<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the value at a dotted path
    Get {
        /// Dotted path, e.g. server.port
        path: String,

        /// Value used when the path is absent (parsed as JSON, else a string)
        #[arg(short, long)]
        default: Option<String>,

        #[command(flatten)]
        extra: ProcessArgsOpt,
    },

    /// Print several values; fails if any is missing
    GetAll {
        #[arg(required = true)]
        paths: Vec<String>,

        #[command(flatten)]
        extra: ProcessArgsOpt,
    },

    /// Print the whole resolved configuration
    Dump {
        #[command(flatten)]
        extra: ProcessArgsOpt,
    },

    /// Look a key up in remote stores directly
    Remote {
        key: String,

        /// Only ask this resolver
        #[arg(long)]
        resolver: Option<String>,

        #[command(flatten)]
        extra: ProcessArgsOpt,
    },

    /// Look a key up in secret stores directly
    Secret {
        key: String,

        /// Only ask this resolver
        #[arg(long)]
        resolver: Option<String>,

        #[command(flatten)]
        extra: ProcessArgsOpt,
    },
}

impl Command {
    pub fn process_args(&self) -> &[String] {
        match self {
            Command::Get { extra, .. }
            | Command::GetAll { extra, .. }
            | Command::Dump { extra }
            | Command::Remote { extra, .. }
            | Command::Secret { extra, .. } => &extra.process_args,
        }
    }
}

/// Parse a `--default` value: JSON when it parses, a plain string otherwise.
pub fn parse_default(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

//! layerconf
//!
//! Resolve layered configuration from the command line.

use anyhow::Result;
use clap::Parser;
use layerconf::cli::{Cli, Command, parse_default};
use layerconf::config::EnvInterpolation;
use layerconf::format::render;
use layerconf::logging;
use layerconf::resolvers::{ConsulResolver, Env, ProcessArgs, VaultResolver};
use layerconf::{ConfigError, DynamicConfig};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Build the configuration handle from CLI options.
fn build_config(cli: &Cli) -> layerconf::Result<DynamicConfig> {
    let env = Env::real();
    let mut builder = DynamicConfig::builder(&cli.root)
        .env(env.clone())
        .args(ProcessArgs::new(cli.command.process_args()))
        .resolver(Arc::new(ConsulResolver::new()))
        .resolver(Arc::new(VaultResolver::new()));

    if cli.interpolate {
        builder = builder.translator(Arc::new(EnvInterpolation::new(env)));
    }
    if let Some(path) = &cli.config_path {
        builder = builder.config_path(path);
    }
    if let Some(environment) = &cli.config_env {
        builder = builder.config_env(environment);
    }
    builder.build()
}

async fn run(cli: &Cli) -> layerconf::Result<Value> {
    let config = build_config(cli)?;
    debug!(?config, "configuration built");

    match &cli.command {
        Command::Get { path, default, .. } => match default {
            Some(default) => config.get_with_default(path, parse_default(default)).await,
            None => config.get(path).await,
        },
        Command::GetAll { paths, .. } => {
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            config.get_all(&paths).await.map(Value::Array)
        }
        Command::Dump { .. } => config.snapshot().await,
        Command::Remote { key, resolver, .. } => {
            config.get_remote_value(key, resolver.as_deref()).await
        }
        Command::Secret { key, resolver, .. } => {
            config.get_secret_value(key, resolver.as_deref()).await
        }
    }
}

fn report(err: &ConfigError) -> ! {
    eprintln!("error [{}]: {}", err.code(), err);
    std::process::exit(1)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log, cli.verbose)?;

    match run(&cli).await {
        Ok(value) => {
            println!("{}", render(&value, cli.format)?);
            Ok(())
        }
        Err(err) => report(&err),
    }
}

mod chunker;
mod cli;
mod commands;
mod config;
mod corrector;
mod error;
mod fidelity;
mod llm;
mod model;
mod structure;
mod text;
mod util;
mod validator;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::PipelineConfig;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Commands::Parse(args) => runtime.block_on(commands::parse::run(args, &config)),
        Commands::Chunk(args) => runtime.block_on(commands::chunk::run(args, &config)),
        Commands::Analyze(args) => commands::analyze::run(args, &config),
        Commands::Validate(args) => runtime.block_on(commands::validate::run(args, &config)),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

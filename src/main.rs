mod chunker;
mod cli;
mod commands;
mod config;
mod documents;
mod error;
mod model;
mod prompt;
mod providers;
mod search;
mod semantic;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "ragindex command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    debug!(
        data_dir = %cli.global.data_dir.display(),
        settings = %cli.global.settings_path().display(),
        "resolved global paths"
    );

    match cli.command {
        Commands::Index(args) => commands::index::run(&cli.global, args),
        Commands::Query(args) => commands::query::run(&cli.global, args),
        Commands::Status(args) => commands::status::run(&cli.global, args),
        Commands::Clear(args) => commands::clear::run(&cli.global, args),
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

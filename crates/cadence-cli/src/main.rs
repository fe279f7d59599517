//! Cadence CLI - songs and setlists from the command line
//!
//! Local catalog management plus snapshot sync against GitHub, Dropbox or a
//! plain file.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cadence=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let db_path = resolve_db_path(cli.db_path.clone(), profile)?;

    match cli.command {
        Commands::Song { command } => commands::song::run_song(command, &db_path).await,
        Commands::Setlist { command } => commands::setlist::run_setlist(command, &db_path).await,
        Commands::Remote { command } => commands::remote::run_remote(command, &db_path).await,
        Commands::Sync { remote, command } => {
            commands::sync::run_sync(command, remote.map(Into::into), &db_path).await
        }
        Commands::Tombstones { command } => {
            commands::tombstones::run_tombstones(command, &db_path).await
        }
        Commands::Export { output } => {
            commands::transfer::run_export(output.as_deref(), &db_path).await
        }
        Commands::Import { path } => commands::transfer::run_import(&path, &db_path).await,
        Commands::Config { command } => commands::config::run_config(command, profile, cli.db_path),
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())
        }
    }
}

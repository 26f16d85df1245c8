//! pagetree CLI - export nested page trees as one Markdown document
//!
//! This is the main entry point for the pagetree command-line interface.
//! Command implementations live in [`commands`].

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use pagetree_core::Config;

mod cli;
mod commands;
mod error;
mod output;
mod utils;

use cli::{Cli, Commands};
use error::ErrorCategory;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = utils::logging::initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ErrorCategory::Internal.as_exit_code();
    }

    match execute_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ErrorCategory::from_anyhow(&err).as_exit_code()
        },
    }
}

async fn execute_command(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Export {
            target,
            depth,
            no_nested,
            output,
            format,
        } => {
            let args = commands::ExportArgs {
                target,
                depth,
                no_nested,
                output,
                format,
            };
            commands::export(&config, &args, cli.quiet).await
        },
        Commands::Tree {
            target,
            depth,
            format,
        } => commands::tree(&config, &target, depth, format).await,
        Commands::Limits { format } => commands::limits(&config, format),
    }
}

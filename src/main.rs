//! Binary entry point for hitport.
//!
//! This binary provides the CLI for exporting and importing a site's hits.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use hitport::config::HitportConfig;
use hitport::observability::{self, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Hitport - export and import of analytics hit history.
#[derive(Parser)]
#[command(name = "hitport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Export a site's hits into a compressed CSV artifact.
    Export {
        /// Site to export.
        #[arg(short, long)]
        site: i64,

        /// Export hits after this hit ID (a previous export's `last_hit_id`).
        #[arg(long, default_value = "0")]
        start_from: i64,

        /// Directory for the artifact (default: the configured export dir).
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Send a notification when the export is done.
        #[arg(long)]
        notify: bool,
    },

    /// Import hits from an export artifact.
    Import {
        /// Site receiving the hits.
        #[arg(short, long)]
        site: i64,

        /// Artifact to import.
        file: PathBuf,

        /// Delete all existing hits of the site first.
        #[arg(long)]
        replace: bool,

        /// Send a notification when the import is done.
        #[arg(long)]
        notify: bool,
    },

    /// List a site's exports of the last day.
    Exports {
        /// Site to list exports for.
        #[arg(short, long)]
        site: i64,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match HitportConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(
    command: Commands,
    config: HitportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Export {
            site,
            start_from,
            dir,
            notify,
        } => commands::cmd_export(config, site, start_from, dir, notify).await,

        Commands::Import {
            site,
            file,
            replace,
            notify,
        } => commands::cmd_import(config, site, file, replace, notify).await,

        Commands::Exports { site } => commands::cmd_exports(config, site).await,

        Commands::Config { show } => commands::cmd_config(&config, show),
    }
}

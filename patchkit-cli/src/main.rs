//! Patchkit CLI - Command-line interface
//!
//! Inspects and produces manifests, checks a local patch directory and runs
//! update checks against a patch server.

mod commands;
mod error;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use patchkit::config::ConfigFile;
use patchkit::logging::{init_logging, LoggingGuard};

use commands::compare::CompareArgs;
use commands::config::ConfigCommands;
use commands::inspect::InspectArgs;
use commands::listing::ListingArgs;
use commands::pack::PackArgs;
use commands::update::UpdateArgs;
use commands::verify::VerifyArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "patchkit")]
#[command(version = patchkit::VERSION)]
#[command(about = "Manifest-driven patch delivery", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write log output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the contents of a manifest
    Inspect(InspectArgs),

    /// Compare two resource versions
    Compare(CompareArgs),

    /// Check the local patch directory for missing or corrupt files
    Verify(VerifyArgs),

    /// Check the patch server and download patches
    Update(UpdateArgs),

    /// Build a manifest from a directory
    Pack(PackArgs),

    /// Print or write the JSON file listing of a manifest
    Listing(ListingArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Compare(args) => commands::compare::run(args),
        Commands::Pack(args) => commands::pack::run(args),
        Commands::Listing(args) => commands::listing::run(args),
        Commands::Config(command) => commands::config::run(command, config_path),
        Commands::Verify(args) => {
            let (config, _guard) = start_session(config_path, cli.verbose)?;
            commands::verify::run(args, config)
        }
        Commands::Update(args) => {
            let (config, _guard) = start_session(config_path, cli.verbose)?;
            commands::update::run(args, config)
        }
    }
}

/// Loads the config and starts file logging for commands that work on the
/// patch directory.
fn start_session(
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<(ConfigFile, LoggingGuard), CliError> {
    let config = commands::common::load_config(config_path)?;
    let guard = init_logging(&config.logging.directory, &config.logging.file, verbose)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    tracing::info!(
        version = patchkit::VERSION,
        save_path = %config.patch.save_path.display(),
        "patchkit starting"
    );
    Ok((config, guard))
}

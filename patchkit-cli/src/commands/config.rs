//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show`, and `config path` for creating and
//! viewing the configuration file.

use std::path::Path;

use clap::Subcommand;
use patchkit::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Create a default configuration file if none exists
    Init,

    /// List all configuration settings
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against `path`, or the default location.
pub fn run(command: ConfigCommands, path: Option<&Path>) -> Result<(), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Init => run_init(&path),
        ConfigCommands::Show => {
            let config = ConfigFile::load_from(&path)?;
            print!("{}", render(&config));
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn run_init(path: &Path) -> Result<(), CliError> {
    if ConfigFile::ensure_exists_at(path)? {
        println!("Created configuration file: {}", path.display());
        println!();
        println!("Set url_prefix in [download] to your patch server before running `patchkit update`.");
    } else {
        println!("Configuration file already exists: {}", path.display());
    }
    Ok(())
}

fn render(config: &ConfigFile) -> String {
    let or_unset = |s: &str| {
        if s.is_empty() {
            "(not set)".to_string()
        } else {
            s.to_string()
        }
    };
    let timeout = match config.download.timeout {
        0 => "none".to_string(),
        secs => format!("{}s", secs),
    };

    let mut out = String::new();
    out.push_str("Configuration Settings\n");
    out.push_str("======================\n\n");

    out.push_str("[patch]\n");
    out.push_str(&format!("  save_path = {}\n", config.patch.save_path.display()));
    out.push_str(&format!("  manifest_name = {}\n", config.patch.manifest_name));
    out.push_str(&format!(
        "  continue_if_update_fail = {}\n\n",
        config.patch.continue_if_update_fail
    ));

    out.push_str("[download]\n");
    out.push_str(&format!("  url_prefix = {}\n", or_unset(&config.download.url_prefix)));
    out.push_str(&format!(
        "  manifest_url = {}\n",
        or_unset(&config.download.manifest_url_for(&config.patch.manifest_name))
    ));
    out.push_str(&format!("  max_concurrent = {}\n", config.download.max_concurrent));
    out.push_str(&format!("  timeout = {}\n", timeout));
    out.push_str(&format!("  auto_retry = {}\n", config.download.auto_retry));
    out.push_str(&format!(
        "  accept_invalid_certs = {}\n\n",
        config.download.accept_invalid_certs
    ));

    out.push_str("[cache]\n");
    out.push_str(&format!(
        "  max_concurrent_loads = {}\n\n",
        config.cache.max_concurrent_loads
    ));

    out.push_str("[logging]\n");
    out.push_str(&format!("  directory = {}\n", config.logging.directory.display()));
    out.push_str(&format!("  file = {}\n", config.logging.file));
    out
}

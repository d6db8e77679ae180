//! Helpers shared by several commands.

use std::path::{Path, PathBuf};

use patchkit::config::ConfigFile;

use crate::error::CliError;

/// Format a size in bytes as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Loads the config file at `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Applies a `--save-path` override.
pub fn with_save_path(mut config: ConfigFile, save_path: Option<PathBuf>) -> ConfigFile {
    if let Some(path) = save_path {
        config.patch.save_path = path;
    }
    config
}

/// Multi-threaded runtime for the commands that talk to the network.
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

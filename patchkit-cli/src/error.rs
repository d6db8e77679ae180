//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use patchkit::config::ConfigFileError;
use patchkit::download::DownloadError;
use patchkit::manifest::ManifestError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to read, decode or write a manifest
    Manifest(ManifestError),
    /// Download session or update check failed
    Download(DownloadError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Local patch directory is missing files
    Incomplete { missing: usize },
    /// Update check did not complete
    UpdateIncomplete,
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Download(e) if e.is_network() => {
                eprintln!();
                eprintln!("Check that:");
                eprintln!("  1. url_prefix in [download] points at the patch server");
                eprintln!("  2. The server is reachable from this machine");
                eprintln!("  3. `patchkit config show` lists the expected manifest URL");
            }
            CliError::Incomplete { .. } => {
                eprintln!();
                eprintln!("Run `patchkit update` to download the missing files.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }

    /// 2 when the run finished but left work undone, 1 for failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Incomplete { .. } | CliError::UpdateIncomplete => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Manifest(e) => write!(f, "Manifest error: {}", e),
            CliError::Download(e) => write!(f, "Download failed: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Incomplete { missing } => {
                write!(f, "{} file(s) missing or corrupt", missing)
            }
            CliError::UpdateIncomplete => write!(f, "Update did not complete; try again later"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Manifest(e) => Some(e),
            CliError::Download(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ManifestError> for CliError {
    fn from(e: ManifestError) -> Self {
        CliError::Manifest(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

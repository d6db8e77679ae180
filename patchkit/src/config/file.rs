//! Loading and saving `config.ini`.

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::defaults::config_file_path;
use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Writes a default config file at `path` unless one exists.
    ///
    /// Returns whether a file was written.
    pub fn ensure_exists_at(path: &Path) -> Result<bool, ConfigFileError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        Ok(true)
    }

    /// [`ensure_exists_at`](Self::ensure_exists_at) for the default path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        Self::ensure_exists_at(&path)?;
        Ok(path)
    }
}

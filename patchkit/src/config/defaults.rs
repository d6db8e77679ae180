//! Default values and standard locations.

use std::path::PathBuf;

/// File name of the primary manifest in the save path.
pub const DEFAULT_MANIFEST_NAME: &str = "StreamingAssets";

pub const DEFAULT_LOG_FILE: &str = "patchkit.log";

/// Directory holding `config.ini` (`<config dir>/patchkit`).
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchkit")
}

pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Where downloaded patches are kept unless configured otherwise.
pub fn default_save_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchkit")
        .join("patches")
}

pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchkit")
        .join("logs")
}

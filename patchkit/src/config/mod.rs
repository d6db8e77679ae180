//! User configuration stored in `config.ini`.
//!
//! Settings structs live in `settings`, constants in `defaults`, INI parsing
//! in `parser`, and serialization in `writer`.
//!
//! # Example
//!
//! ```
//! use patchkit::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.patch.manifest_name, "StreamingAssets");
//! assert_eq!(config.downloader_config().max_concurrent, 5);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    config_directory, config_file_path, default_log_directory, default_save_path,
    DEFAULT_LOG_FILE, DEFAULT_MANIFEST_NAME,
};
pub use file::ConfigFileError;
pub use settings::{CacheSettings, ConfigFile, DownloadSettings, LoggingSettings, PatchSettings};

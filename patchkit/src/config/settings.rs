//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;
use std::time::Duration;

use super::defaults::{
    default_log_directory, default_save_path, DEFAULT_LOG_FILE, DEFAULT_MANIFEST_NAME,
};
use crate::bundle::{CacheConfig, DEFAULT_MAX_CONCURRENT_LOADS};
use crate::download::{DownloaderConfig, DEFAULT_MAX_CONCURRENT_DOWNLOADS};
use crate::update::UpdateSettings;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub patch: PatchSettings,
    pub download: DownloadSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

/// `[patch]`: where patches live and how updates behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSettings {
    pub save_path: PathBuf,
    /// File name of the primary manifest inside `save_path`.
    pub manifest_name: String,
    /// Treat an unreachable update server as "nothing to update".
    pub continue_if_update_fail: bool,
}

/// `[download]`: patch server and downloader tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Prefix joined with each file name to form its URL.
    pub url_prefix: String,
    /// Remote manifest URL; `None` means `{url_prefix}{manifest_name}`.
    pub manifest_url: Option<String>,
    pub max_concurrent: usize,
    /// Request timeout in seconds; 0 disables the timeout.
    pub timeout: u64,
    pub auto_retry: bool,
    pub accept_invalid_certs: bool,
}

/// `[cache]`: bundle loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_concurrent_loads: usize,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            patch: PatchSettings {
                save_path: default_save_path(),
                manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
                continue_if_update_fail: false,
            },
            download: DownloadSettings {
                url_prefix: String::new(),
                manifest_url: None,
                max_concurrent: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
                timeout: 0,
                auto_retry: false,
                accept_invalid_certs: false,
            },
            cache: CacheSettings {
                max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

impl DownloadSettings {
    pub fn manifest_url_for(&self, manifest_name: &str) -> String {
        match &self.manifest_url {
            Some(url) => url.clone(),
            None => format!("{}{}", self.url_prefix, manifest_name),
        }
    }
}

impl ConfigFile {
    pub fn downloader_config(&self) -> DownloaderConfig {
        let timeout = (self.download.timeout > 0).then(|| Duration::from_secs(self.download.timeout));
        DownloaderConfig::new()
            .with_max_concurrent(self.download.max_concurrent)
            .with_timeout(timeout)
            .with_auto_retry(self.download.auto_retry)
            .with_accept_invalid_certs(self.download.accept_invalid_certs)
            .with_manifest_name(self.patch.manifest_name.clone())
    }

    /// Bundle cache rooted at the patch save path.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.patch.save_path.clone())
            .with_max_concurrent_loads(self.cache.max_concurrent_loads)
    }

    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            manifest_url: self.download.manifest_url_for(&self.patch.manifest_name),
            url_prefix: self.download.url_prefix.clone(),
            save_path: self.patch.save_path.clone(),
            manifest_name: self.patch.manifest_name.clone(),
            continue_if_update_fail: self.patch.continue_if_update_fail,
            downloader: self.downloader_config(),
        }
    }
}

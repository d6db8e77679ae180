//! Downloader configuration.

use std::time::Duration;

use crate::config::DEFAULT_MANIFEST_NAME;

/// Default number of files downloaded at once.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 5;

/// Settings for a [`PatchDownloader`](super::PatchDownloader) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Upper bound on requests in flight.
    pub max_concurrent: usize,
    /// Per-request timeout; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Re-queue failed files immediately instead of failing the session.
    pub auto_retry: bool,
    /// Accept self-signed and otherwise invalid certificates.
    pub accept_invalid_certs: bool,
    /// File name the manifest is saved under in the save path.
    pub manifest_name: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            timeout: None,
            auto_retry: false,
            accept_invalid_certs: false,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        }
    }
}

impl DownloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency bound; zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.timeout, None);
        assert!(!config.auto_retry);
        assert!(!config.accept_invalid_certs);
        assert_eq!(config.manifest_name, "StreamingAssets");
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config = DownloaderConfig::new().with_max_concurrent(0);
        assert_eq!(config.max_concurrent, 1);
    }
}

//! The update check loop.

use std::path::PathBuf;
use std::sync::Arc;

use crate::download::{
    fetch_manifest, DownloadControl, DownloadResult, DownloaderConfig, FileFetcher, HttpFetcher,
    PatchDownloader, SessionProgress, SessionState,
};
use crate::manifest::{check_resource_version, load_manifest, CheckResult, Manifest};

/// What the caller should do after an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Keep running the current resources.
    Nothing,
    /// Patches were downloaded; restart to load them.
    DownloadPatches,
    /// The remote version needs a new application build.
    DownloadApp,
    /// The check did not complete; try again later.
    Retry,
}

/// Receives update notifications and answers prompts.
///
/// Every method has a default, so listeners implement only what they
/// present to the user. The defaults accept every download and never retry
/// after an error.
pub trait UpdateListener: Send + Sync {
    fn update_started(&self) {}

    fn update_complete(&self, _outcome: UpdateOutcome) {}

    /// The server could not be reached or a download failed.
    ///
    /// Returns true to try again.
    fn net_error(&self) -> bool {
        false
    }

    /// Asks before downloading `bytes` in `files` files.
    fn confirm_patch_download(&self, _bytes: u64, _files: usize) -> bool {
        true
    }

    /// Asks before sending the user to an application download for
    /// `version`.
    fn confirm_app_download(&self, _version: &str) -> bool {
        true
    }

    fn progress(&self, _progress: &SessionProgress) {}
}

/// Listener that takes every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl UpdateListener for NoopListener {}

/// Where to look for updates and where to put them.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub manifest_url: String,
    pub url_prefix: String,
    pub save_path: PathBuf,
    /// Name the downloaded manifest is saved under.
    pub manifest_name: String,
    /// Treat an abandoned update as "nothing to do" instead of `Retry`.
    pub continue_if_update_fail: bool,
    pub downloader: DownloaderConfig,
}

/// Drives one update check: fetch the remote manifest, compare versions,
/// download patches.
pub struct UpdateFlow {
    settings: UpdateSettings,
    fetcher: Arc<dyn FileFetcher>,
    listener: Arc<dyn UpdateListener>,
    control: DownloadControl,
    running_version: Option<String>,
}

impl UpdateFlow {
    pub fn new(
        settings: UpdateSettings,
        fetcher: Arc<dyn FileFetcher>,
        listener: Arc<dyn UpdateListener>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            listener,
            control: DownloadControl::new(),
            running_version: None,
        }
    }

    /// A flow backed by [`HttpFetcher`].
    pub fn with_http(
        settings: UpdateSettings,
        listener: Arc<dyn UpdateListener>,
    ) -> DownloadResult<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&settings.downloader)?);
        Ok(Self::new(settings, fetcher, listener))
    }

    /// Compares against `version` instead of the saved manifest.
    pub fn with_running_version(mut self, version: impl Into<String>) -> Self {
        self.running_version = Some(version.into());
        self
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// Pauses or stops the download of the current check.
    pub fn control(&self) -> DownloadControl {
        self.control.clone()
    }

    /// Version of the manifest saved in the save path, empty if none.
    pub fn local_version(&self) -> String {
        let path = self.settings.save_path.join(&self.settings.manifest_name);
        match load_manifest(&path) {
            Ok(manifest) => manifest.version().to_string(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable local manifest");
                String::new()
            }
        }
    }

    pub fn running_version(&self) -> String {
        self.running_version
            .clone()
            .unwrap_or_else(|| self.local_version())
    }

    /// Runs one check and reports it to the listener.
    pub async fn check_and_update(&self) -> UpdateOutcome {
        self.listener.update_started();
        let outcome = self.check().await;
        tracing::info!(?outcome, "update check finished");
        self.listener.update_complete(outcome);
        outcome
    }

    async fn check(&self) -> UpdateOutcome {
        let remote = loop {
            match fetch_manifest(
                self.fetcher.as_ref(),
                &self.settings.manifest_url,
                &self.settings.manifest_name,
            )
            .await
            {
                Ok(manifest) => break Arc::new(manifest),
                Err(e) => {
                    tracing::warn!(url = %self.settings.manifest_url, error = %e, "failed to fetch remote manifest");
                    if !self.listener.net_error() {
                        return self.abandon();
                    }
                }
            }
        };

        let current = self.running_version();
        let decision = check_resource_version(&current, remote.version());
        tracing::info!(current = %current, remote = %remote.version(), %decision, "compared versions");

        match decision {
            CheckResult::Nothing => UpdateOutcome::Nothing,
            CheckResult::DownloadApp => {
                if self.listener.confirm_app_download(remote.version()) {
                    UpdateOutcome::DownloadApp
                } else {
                    self.abandon()
                }
            }
            CheckResult::DownloadPatches => self.download_patches(remote).await,
            CheckResult::NeedCheck | CheckResult::Retry => UpdateOutcome::Retry,
        }
    }

    async fn download_patches(&self, remote: Arc<Manifest>) -> UpdateOutcome {
        let mut downloader = PatchDownloader::new(
            Arc::clone(&self.fetcher),
            self.settings
                .downloader
                .clone()
                .with_manifest_name(self.settings.manifest_name.clone()),
            self.settings.save_path.clone(),
            self.settings.url_prefix.clone(),
        )
        .with_control(self.control.clone());
        {
            let listener = Arc::clone(&self.listener);
            downloader.on_progress(move |progress| listener.progress(progress));
        }

        let planned = loop {
            match downloader.prepare(Arc::clone(&remote)).await {
                Ok(planned) => break planned,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to prepare patch download");
                    if !self.listener.net_error() {
                        return self.abandon();
                    }
                }
            }
        };

        if planned.needs_download()
            && !self
                .listener
                .confirm_patch_download(planned.total_task_size, planned.total_task_count)
        {
            downloader.stop();
            return self.abandon();
        }

        let mut result = downloader.run().await;
        loop {
            match result {
                Ok(SessionState::Succeeded) => break,
                Ok(_) if self.control.is_stopped() => return self.abandon(),
                Ok(_) => {
                    tracing::warn!(failed = downloader.failed_tasks().len(), "patch download incomplete")
                }
                Err(e) => tracing::warn!(error = %e, "patch download failed"),
            }
            if !self.listener.net_error() {
                downloader.stop();
                return self.abandon();
            }
            result = downloader.retry().await;
        }

        tracing::info!(version = %remote.version(), "patches downloaded, restart required");
        UpdateOutcome::DownloadPatches
    }

    fn abandon(&self) -> UpdateOutcome {
        if self.settings.continue_if_update_fail {
            UpdateOutcome::Nothing
        } else {
            UpdateOutcome::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::MockFetcher;
    use crate::integrity::bytes_md5;
    use crate::manifest::{encode, FileInfo, ManifestBuilder};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const MANIFEST_URL: &str = "http://cdn/meta/StreamingAssets";
    const PREFIX: &str = "http://cdn/patch/";

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        retries_left: AtomicUsize,
        decline: bool,
    }

    impl Recorder {
        fn retrying(times: usize) -> Self {
            Self {
                retries_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        fn declining() -> Self {
            Self {
                decline: true,
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl UpdateListener for Recorder {
        fn update_started(&self) {
            self.events.lock().push("started".into());
        }

        fn update_complete(&self, outcome: UpdateOutcome) {
            self.events.lock().push(format!("complete {:?}", outcome));
        }

        fn net_error(&self) -> bool {
            self.events.lock().push("net_error".into());
            self.retries_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }

        fn confirm_patch_download(&self, bytes: u64, files: usize) -> bool {
            self.events
                .lock()
                .push(format!("confirm {} bytes {} files", bytes, files));
            !self.decline
        }

        fn confirm_app_download(&self, version: &str) -> bool {
            self.events.lock().push(format!("app {}", version));
            !self.decline
        }
    }

    fn settings(dir: &TempDir, continue_if_update_fail: bool) -> UpdateSettings {
        UpdateSettings {
            manifest_url: MANIFEST_URL.to_string(),
            url_prefix: PREFIX.to_string(),
            save_path: dir.path().to_path_buf(),
            manifest_name: "StreamingAssets".to_string(),
            continue_if_update_fail,
            downloader: DownloaderConfig::default(),
        }
    }

    fn publish(fetcher: &MockFetcher, version: &str) {
        let body = b"hud bundle".to_vec();
        fetcher.serve(&format!("{}hud.bundle", PREFIX), body.clone());
        let manifest = ManifestBuilder::new("remote")
            .version(version)
            .file(
                FileInfo::new("hud", "hud.bundle")
                    .with_size(body.len() as i64)
                    .with_md5(bytes_md5(&body)),
            )
            .build()
            .unwrap();
        fetcher.serve(MANIFEST_URL, encode(&manifest).unwrap());
    }

    fn flow(dir: &TempDir, fetcher: &MockFetcher, listener: Arc<Recorder>) -> UpdateFlow {
        UpdateFlow::new(settings(dir, false), Arc::new(fetcher.clone()), listener)
    }

    #[tokio::test]
    async fn test_same_version_is_nothing() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        publish(&fetcher, "1.0+1");
        let listener = Arc::new(Recorder::default());

        let outcome = flow(&dir, &fetcher, Arc::clone(&listener))
            .with_running_version("1.0+1")
            .check_and_update()
            .await;
        assert_eq!(outcome, UpdateOutcome::Nothing);
        assert_eq!(listener.events(), vec!["started", "complete Nothing"]);
    }

    #[tokio::test]
    async fn test_newer_build_downloads_patches() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        publish(&fetcher, "1.0+2");
        let listener = Arc::new(Recorder::default());

        let flow = flow(&dir, &fetcher, Arc::clone(&listener)).with_running_version("1.0+1");
        assert_eq!(flow.check_and_update().await, UpdateOutcome::DownloadPatches);
        assert!(dir.path().join("hud.bundle").exists());
        assert_eq!(flow.local_version(), "1.0+2");
        assert!(listener
            .events()
            .contains(&"confirm 10 bytes 1 files".to_string()));
    }

    #[tokio::test]
    async fn test_saved_manifest_is_the_running_version() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        publish(&fetcher, "1.0+2");
        let listener = Arc::new(Recorder::default());

        let flow = flow(&dir, &fetcher, Arc::clone(&listener));
        assert_eq!(flow.running_version(), "");
        assert_eq!(flow.check_and_update().await, UpdateOutcome::DownloadPatches);
        assert_eq!(flow.check_and_update().await, UpdateOutcome::Nothing);
    }

    #[tokio::test]
    async fn test_newer_app_version_asks_for_app_download() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        publish(&fetcher, "2.0+0");
        let listener = Arc::new(Recorder::default());

        let outcome = flow(&dir, &fetcher, Arc::clone(&listener))
            .with_running_version("1.0+9")
            .check_and_update()
            .await;
        assert_eq!(outcome, UpdateOutcome::DownloadApp);
        assert!(listener.events().contains(&"app 2.0+0".to_string()));
        assert!(!dir.path().join("hud.bundle").exists());
    }

    #[tokio::test]
    async fn test_declined_patch_download_is_abandoned() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        publish(&fetcher, "1.0+2");
        let listener = Arc::new(Recorder::declining());

        let outcome = flow(&dir, &fetcher, listener)
            .with_running_version("1.0+1")
            .check_and_update()
            .await;
        assert_eq!(outcome, UpdateOutcome::Retry);
        assert!(!dir.path().join("hud.bundle").exists());
    }

    #[tokio::test]
    async fn test_net_error_without_retry() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        let listener = Arc::new(Recorder::default());

        let outcome = flow(&dir, &fetcher, Arc::clone(&listener))
            .check_and_update()
            .await;
        assert_eq!(outcome, UpdateOutcome::Retry);
        assert_eq!(
            listener.events(),
            vec!["started", "net_error", "complete Retry"]
        );

        let tolerant = UpdateFlow::new(
            settings(&dir, true),
            Arc::new(fetcher.clone()),
            Arc::new(NoopListener),
        );
        assert_eq!(tolerant.check_and_update().await, UpdateOutcome::Nothing);
    }

    #[tokio::test]
    async fn test_net_error_then_retry_succeeds() {
        let dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new();
        publish(&fetcher, "1.0+2");
        fetcher.fail(MANIFEST_URL, 1);
        fetcher.fail(&format!("{}hud.bundle", PREFIX), 1);
        let listener = Arc::new(Recorder::retrying(2));

        let outcome = flow(&dir, &fetcher, Arc::clone(&listener))
            .with_running_version("1.0+1")
            .check_and_update()
            .await;
        assert_eq!(outcome, UpdateOutcome::DownloadPatches);
        let net_errors = listener
            .events()
            .iter()
            .filter(|e| e.as_str() == "net_error")
            .count();
        assert_eq!(net_errors, 2);
    }
}

//! Download session: prepare, run, retry, pause and stop.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::config::DownloaderConfig;
use super::error::{DownloadError, DownloadResult};
use super::fetcher::{fetch_manifest, ByteSink, FileFetcher, HttpFetcher};
use super::progress::{ProgressCallback, ProgressCounters, SessionProgress};
use super::promote::promote_sub_patches;
use super::task::{DownloadTask, TaskState};
use crate::integrity::{check_file_info, IntegrityCheck};
use crate::manifest::{save_manifest, FileInfo, Manifest};

/// Session lifecycle. Pausing does not change the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Running,
    Succeeded,
    Failed,
}

/// Per-file outcome delivered to the event callback.
#[derive(Debug)]
pub enum DownloadEvent<'a> {
    Succeeded {
        task: &'a DownloadTask,
    },
    /// Covers network failures and files that failed verification.
    Failed {
        task: &'a DownloadTask,
        error: &'a DownloadError,
    },
}

/// Event callback for per-file outcomes.
pub type EventCallback = Arc<dyn Fn(&DownloadEvent<'_>) + Send + Sync>;

struct ControlInner {
    paused: watch::Sender<bool>,
    cancel: Mutex<CancellationToken>,
}

/// Cloneable handle for pausing and stopping a running session from
/// another task or a signal handler.
#[derive(Clone)]
pub struct DownloadControl {
    inner: Arc<ControlInner>,
}

impl Default for DownloadControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControlInner {
                paused,
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Stops dequeuing new files. Requests in flight run to completion.
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Aborts the session. Partial files are deleted.
    pub fn stop(&self) {
        self.inner.cancel.lock().cancel();
    }

    /// Whether `stop` was called since the session was last prepared.
    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.lock().is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.inner.cancel.lock().clone()
    }

    fn rearm(&self) {
        *self.inner.cancel.lock() = CancellationToken::new();
    }

    fn subscribe_pause(&self) -> watch::Receiver<bool> {
        self.inner.paused.subscribe()
    }
}

impl std::fmt::Debug for DownloadControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadControl")
            .field("paused", &self.is_paused())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

type TaskFuture = BoxFuture<'static, (DownloadTask, DownloadResult<u64>)>;

/// Downloads the files of a manifest into a save directory.
///
/// Files already present with the declared size and md5 are skipped. At
/// most `max_concurrent` requests are in flight; the rest wait in a FIFO
/// queue. When every file has arrived, sub-patches are promoted and the
/// manifest is saved next to the files as `config.manifest_name`.
pub struct PatchDownloader {
    config: DownloaderConfig,
    fetcher: Arc<dyn FileFetcher>,
    save_path: PathBuf,
    url_prefix: String,
    manifest: Option<Arc<Manifest>>,
    remote_url: Option<String>,
    prepared: bool,
    queue: VecDeque<DownloadTask>,
    failed: Vec<DownloadTask>,
    state: SessionState,
    counters: Arc<ProgressCounters>,
    control: DownloadControl,
    on_progress: Option<ProgressCallback>,
    on_event: Option<EventCallback>,
}

impl PatchDownloader {
    pub fn new(
        fetcher: Arc<dyn FileFetcher>,
        config: DownloaderConfig,
        save_path: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            config,
            fetcher,
            save_path: save_path.into(),
            url_prefix: url_prefix.into(),
            manifest: None,
            remote_url: None,
            prepared: false,
            queue: VecDeque::new(),
            failed: Vec::new(),
            state: SessionState::Idle,
            counters: Arc::new(ProgressCounters::new()),
            control: DownloadControl::new(),
            on_progress: None,
            on_event: None,
        }
    }

    /// A downloader backed by [`HttpFetcher`].
    pub fn with_http(
        config: DownloaderConfig,
        save_path: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> DownloadResult<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self::new(fetcher, config, save_path, url_prefix))
    }

    /// Shares `control` with this session, e.g. one owned by a caller that
    /// creates several sessions over time.
    pub fn with_control(mut self, control: DownloadControl) -> Self {
        self.control = control;
        self
    }

    pub fn on_progress(&mut self, callback: impl Fn(&SessionProgress) + Send + Sync + 'static) {
        self.on_progress = Some(Arc::new(callback));
    }

    pub fn on_event(&mut self, callback: impl Fn(&DownloadEvent<'_>) + Send + Sync + 'static) {
        self.on_event = Some(Arc::new(callback));
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<dyn FileFetcher> {
        &self.fetcher
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn control(&self) -> DownloadControl {
        self.control.clone()
    }

    pub fn manifest(&self) -> Option<&Arc<Manifest>> {
        self.manifest.as_ref()
    }

    pub fn progress(&self) -> SessionProgress {
        self.counters.snapshot()
    }

    pub fn queued_tasks(&self) -> impl Iterator<Item = &DownloadTask> {
        self.queue.iter()
    }

    pub fn failed_tasks(&self) -> &[DownloadTask] {
        &self.failed
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Stops the session.
    ///
    /// A running session notices through its [`DownloadControl`]; an idle
    /// one is failed immediately.
    pub fn stop(&mut self) {
        self.control.stop();
        if self.state != SessionState::Running {
            self.abandon();
        }
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    /// Plans a session for `manifest`.
    ///
    /// Local files that match their entry are skipped. Corrupt ones are
    /// deleted and queued with the missing ones.
    pub async fn prepare(&mut self, manifest: Arc<Manifest>) -> DownloadResult<SessionProgress> {
        self.begin_prepare();
        self.manifest = Some(Arc::clone(&manifest));

        match self.plan(&manifest).await {
            Ok(tasks) => {
                let total_size = tasks.iter().map(DownloadTask::expected_size).sum();
                self.counters.reset(tasks.len(), total_size);
                self.queue = tasks.into();
                self.prepared = true;
                let progress = self.counters.snapshot();
                tracing::info!(
                    manifest = %manifest.name(),
                    version = %manifest.version(),
                    tasks = progress.total_task_count,
                    bytes = progress.total_task_size,
                    "prepared download session"
                );
                Ok(progress)
            }
            Err(e) => {
                tracing::warn!(manifest = %manifest.name(), error = %e, "failed to prepare download session");
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Fetches the manifest at `manifest_url`, then prepares it.
    ///
    /// The manifest takes `config.manifest_name` whatever the URL ends with.
    pub async fn prepare_remote(&mut self, manifest_url: &str) -> DownloadResult<SessionProgress> {
        self.begin_prepare();
        self.remote_url = Some(manifest_url.to_string());
        self.manifest = None;

        let fetched =
            fetch_manifest(self.fetcher.as_ref(), manifest_url, &self.config.manifest_name).await;
        match fetched {
            Ok(manifest) => self.prepare(Arc::new(manifest)).await,
            Err(e) => {
                tracing::warn!(url = %manifest_url, error = %e, "failed to fetch manifest");
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    fn begin_prepare(&mut self) {
        self.state = SessionState::Preparing;
        self.prepared = false;
        self.control.rearm();
        self.queue.clear();
        self.failed.clear();
        self.counters.reset(0, 0);
    }

    async fn plan(&self, manifest: &Manifest) -> DownloadResult<Vec<DownloadTask>> {
        tokio::fs::create_dir_all(&self.save_path)
            .await
            .map_err(|source| DownloadError::CreateDirFailed {
                path: self.save_path.clone(),
                source,
            })?;

        let save_path = self.save_path.clone();
        let files = manifest.files().to_vec();
        let stale = tokio::task::spawn_blocking(move || stale_files(&save_path, files))
            .await
            .map_err(|e| DownloadError::ReadFailed {
                path: self.save_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })??;

        Ok(stale
            .iter()
            .map(|info| DownloadTask::for_file(&self.url_prefix, &self.save_path, info))
            .collect())
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Runs queued tasks until the queue drains or the session is stopped.
    ///
    /// Returns the terminal state. An `Err` is returned only when the
    /// session was never prepared or finishing a successful session failed.
    pub async fn run(&mut self) -> DownloadResult<SessionState> {
        if !self.prepared {
            return Err(DownloadError::NotPrepared);
        }
        self.state = SessionState::Running;

        let token = self.control.token();
        let mut paused = self.control.subscribe_pause();
        let mut in_flight: FuturesUnordered<TaskFuture> = FuturesUnordered::new();
        let mut running: HashSet<PathBuf> = HashSet::new();
        let max_concurrent = self.config.max_concurrent.max(1);

        loop {
            while !self.control.is_paused()
                && in_flight.len() < max_concurrent
                && !token.is_cancelled()
            {
                let Some(mut task) = self.queue.pop_front() else {
                    break;
                };
                task.state = TaskState::Running;
                tracing::debug!(url = %task.url, "starting download");
                running.insert(task.save_path.clone());
                in_flight.push(self.start(task));
            }

            if in_flight.is_empty() && self.queue.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    drop(in_flight);
                    self.discard_partials(&running).await;
                    self.abandon();
                    tracing::info!("download session stopped");
                    return Ok(self.state);
                }
                Some((task, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    running.remove(&task.save_path);
                    self.complete(task, result);
                }
                _ = paused.changed() => {
                    tracing::debug!(paused = self.control.is_paused(), "pause state changed");
                }
            }
        }

        if !self.failed.is_empty() {
            self.state = SessionState::Failed;
            tracing::warn!(failed = self.failed.len(), "download session failed");
            return Ok(self.state);
        }

        if let Err(e) = self.finish().await {
            self.state = SessionState::Failed;
            return Err(e);
        }
        self.state = SessionState::Succeeded;
        tracing::info!(
            downloaded = self.counters.snapshot().downloaded_count,
            "download session succeeded"
        );
        Ok(self.state)
    }

    /// Re-runs a failed session.
    ///
    /// If the session never got a task list, or was stopped, it is prepared
    /// again from scratch. Otherwise only the failed files are re-queued.
    pub async fn retry(&mut self) -> DownloadResult<SessionState> {
        if self.prepared {
            self.control.rearm();
            for mut task in std::mem::take(&mut self.failed) {
                task.state = TaskState::Pending;
                self.queue.push_back(task);
            }
            tracing::info!(tasks = self.queue.len(), "retrying failed downloads");
        } else if let Some(manifest) = self.manifest.clone() {
            self.prepare(manifest).await?;
        } else if let Some(url) = self.remote_url.clone() {
            self.prepare_remote(&url).await?;
        } else {
            return Err(DownloadError::NotPrepared);
        }
        self.run().await
    }

    fn start(&self, task: DownloadTask) -> TaskFuture {
        let fetcher = Arc::clone(&self.fetcher);
        let counters = Arc::clone(&self.counters);
        let on_progress = self.on_progress.clone();

        async move {
            let streamed = Arc::new(AtomicU64::new(0));
            let sink: ByteSink = {
                let streamed = Arc::clone(&streamed);
                let counters = Arc::clone(&counters);
                Arc::new(move |bytes| {
                    streamed.fetch_add(bytes, Ordering::SeqCst);
                    counters.add_in_flight(bytes);
                    if let Some(callback) = &on_progress {
                        callback(&counters.snapshot());
                    }
                })
            };

            let result = fetcher
                .fetch_to_file(task.url.clone(), task.save_path.clone(), sink)
                .await;
            counters.remove_in_flight(streamed.load(Ordering::SeqCst));

            let result = match result {
                Ok(written) => verify(&task, written).await,
                Err(e) => Err(e),
            };
            (task, result)
        }
        .boxed()
    }

    fn complete(&mut self, mut task: DownloadTask, result: DownloadResult<u64>) {
        match result {
            Ok(bytes) => {
                task.state = TaskState::Succeeded;
                self.counters.record_success(bytes);
                tracing::debug!(file = %task.file_name(), bytes, "download complete");
                self.emit(&DownloadEvent::Succeeded { task: &task });
                self.report();
            }
            Err(error) => {
                task.error_count += 1;
                task.state = TaskState::Failed;
                tracing::warn!(
                    file = %task.file_name(),
                    attempts = task.error_count,
                    error = %error,
                    "download failed"
                );
                self.emit(&DownloadEvent::Failed {
                    task: &task,
                    error: &error,
                });
                if self.config.auto_retry {
                    task.state = TaskState::Pending;
                    self.queue.push_back(task);
                } else {
                    self.failed.push(task);
                }
            }
        }
    }

    fn emit(&self, event: &DownloadEvent<'_>) {
        if let Some(callback) = &self.on_event {
            callback(event);
        }
    }

    fn report(&self) {
        if let Some(callback) = &self.on_progress {
            callback(&self.counters.snapshot());
        }
    }

    async fn discard_partials(&self, running: &HashSet<PathBuf>) {
        for path in running {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed partial download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove partial download")
                }
            }
        }
    }

    fn abandon(&mut self) {
        self.queue.clear();
        self.failed.clear();
        self.prepared = false;
        self.state = SessionState::Failed;
    }

    async fn finish(&self) -> DownloadResult<()> {
        let Some(manifest) = self.manifest.clone() else {
            return Ok(());
        };
        let save_path = self.save_path.clone();
        let manifest_path = save_path.join(&self.config.manifest_name);

        tokio::task::spawn_blocking(move || -> DownloadResult<()> {
            promote_sub_patches(&save_path, &manifest)?;
            save_manifest(&manifest_path, &manifest)?;
            Ok(())
        })
        .await
        .map_err(|e| DownloadError::WriteFailed {
            path: self.save_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?
    }
}

impl std::fmt::Debug for PatchDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchDownloader")
            .field("save_path", &self.save_path)
            .field("url_prefix", &self.url_prefix)
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

/// Entries of `files` that are missing or corrupt under `save_path`.
///
/// Corrupt files are deleted. Entries sharing a file name are planned once.
fn stale_files(save_path: &Path, files: Vec<FileInfo>) -> DownloadResult<Vec<FileInfo>> {
    let mut seen = HashSet::new();
    let mut stale = Vec::new();

    for info in files {
        if !seen.insert(info.file_name.clone()) {
            continue;
        }
        let path = save_path.join(&info.file_name);
        let check = check_file_info(&path, &info).map_err(|source| DownloadError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        match check {
            IntegrityCheck::Valid => continue,
            IntegrityCheck::Missing => {}
            corrupt => {
                tracing::info!(file = %info.file_name, reason = %corrupt, "local file is corrupt, re-downloading");
                std::fs::remove_file(&path)
                    .map_err(|source| DownloadError::RemoveFailed { path, source })?;
            }
        }
        stale.push(info);
    }
    Ok(stale)
}

/// Checks a downloaded file against its manifest entry, deleting it on
/// mismatch.
async fn verify(task: &DownloadTask, written: u64) -> DownloadResult<u64> {
    let Some(info) = task.expected.clone() else {
        return Ok(written);
    };
    let path = task.save_path.clone();

    let check = {
        let (path, info) = (path.clone(), info.clone());
        tokio::task::spawn_blocking(move || check_file_info(&path, &info)).await
    };
    let check = check
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .and_then(|checked| checked)
        .map_err(|source| DownloadError::ReadFailed {
            path: path.clone(),
            source,
        })?;

    if check.is_valid() {
        return Ok(written);
    }
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(DownloadError::RemoveFailed { path, source }),
    }
    Err(DownloadError::Integrity {
        file_name: info.file_name,
        reason: check.to_string(),
    })
}

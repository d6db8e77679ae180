//! Network access for patch downloads.
//!
//! [`FileFetcher`] is the seam between the scheduler and the network.
//! [`HttpFetcher`] streams response bodies to disk with `reqwest`; tests
//! substitute an in-memory fetcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::AsyncWriteExt;

use super::config::DownloaderConfig;
use super::error::{DownloadError, DownloadResult};
use crate::manifest::{decode, Manifest};

/// Receives the size of each chunk as it is written.
pub type ByteSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Fetches remote files.
///
/// Futures are `'static` so the scheduler can hold many of them in flight
/// and drop them on stop.
pub trait FileFetcher: Send + Sync {
    /// Streams `url` into `dest`, returning the number of bytes written.
    ///
    /// Implementations remove a partially written `dest` when they fail.
    fn fetch_to_file(
        &self,
        url: String,
        dest: PathBuf,
        on_bytes: ByteSink,
    ) -> BoxFuture<'static, DownloadResult<u64>>;

    /// Fetches `url` into memory.
    fn fetch_bytes(&self, url: String) -> BoxFuture<'static, DownloadResult<Bytes>>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Builds a client honoring the timeout and certificate settings.
    pub fn new(config: &DownloaderConfig) -> DownloadResult<Self> {
        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DownloadError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    fn request_error(url: &str, timeout: Option<Duration>, e: reqwest::Error) -> DownloadError {
        match timeout {
            Some(timeout) if e.is_timeout() => DownloadError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            },
            _ => DownloadError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            },
        }
    }

    async fn get(
        client: &reqwest::Client,
        url: &str,
        timeout: Option<Duration>,
    ) -> DownloadResult<reqwest::Response> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::request_error(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn stream_to_file(
        client: &reqwest::Client,
        url: &str,
        dest: &Path,
        timeout: Option<Duration>,
        on_bytes: &ByteSink,
    ) -> DownloadResult<u64> {
        let mut response = Self::get(client, url, timeout).await?;

        let write_err = |source| DownloadError::WriteFailed {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(write_err)?;

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::request_error(url, timeout, e))?
        {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
            on_bytes(chunk.len() as u64);
        }
        file.flush().await.map_err(write_err)?;

        Ok(written)
    }
}

impl FileFetcher for HttpFetcher {
    fn fetch_to_file(
        &self,
        url: String,
        dest: PathBuf,
        on_bytes: ByteSink,
    ) -> BoxFuture<'static, DownloadResult<u64>> {
        let client = self.client.clone();
        let timeout = self.timeout;
        async move {
            let result = Self::stream_to_file(&client, &url, &dest, timeout, &on_bytes).await;
            if result.is_err() {
                let _ = tokio::fs::remove_file(&dest).await;
            }
            result
        }
        .boxed()
    }

    fn fetch_bytes(&self, url: String) -> BoxFuture<'static, DownloadResult<Bytes>> {
        let client = self.client.clone();
        let timeout = self.timeout;
        async move {
            let response = Self::get(&client, &url, timeout).await?;
            response
                .bytes()
                .await
                .map_err(|e| Self::request_error(&url, timeout, e))
        }
        .boxed()
    }
}

/// Downloads and decodes a manifest.
///
/// `name` becomes the manifest's name.
pub async fn fetch_manifest(
    fetcher: &dyn FileFetcher,
    url: &str,
    name: &str,
) -> DownloadResult<Manifest> {
    let bytes = fetcher.fetch_bytes(url.to_string()).await?;
    let manifest = decode(name, &bytes)?;
    tracing::debug!(url, version = %manifest.version(), files = manifest.files().len(), "fetched manifest");
    Ok(manifest)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockState {
        files: Mutex<HashMap<String, Bytes>>,
        failures: Mutex<HashMap<String, usize>>,
        hang: Mutex<Vec<String>>,
        delay: Mutex<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        requests: AtomicUsize,
    }

    struct InFlight(Arc<MockState>);

    impl InFlight {
        fn enter(state: &Arc<MockState>) -> Self {
            let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_in_flight.fetch_max(now, Ordering::SeqCst);
            state.requests.fetch_add(1, Ordering::SeqCst);
            Self(Arc::clone(state))
        }
    }

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// In-memory fetcher keyed by URL, with failure injection.
    #[derive(Clone, Default)]
    pub struct MockFetcher {
        state: Arc<MockState>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, body: impl Into<Bytes>) -> &Self {
            self.state.files.lock().insert(url.to_string(), body.into());
            self
        }

        /// The next `times` requests for `url` fail with a network error.
        pub fn fail(&self, url: &str, times: usize) -> &Self {
            self.state.failures.lock().insert(url.to_string(), times);
            self
        }

        /// Requests for `url` write a few bytes and then never complete.
        pub fn hang(&self, url: &str) -> &Self {
            self.state.hang.lock().push(url.to_string());
            self
        }

        pub fn with_delay(self, delay: Duration) -> Self {
            *self.state.delay.lock() = delay;
            self
        }

        pub fn max_in_flight(&self) -> usize {
            self.state.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn in_flight(&self) -> usize {
            self.state.in_flight.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> usize {
            self.state.requests.load(Ordering::SeqCst)
        }

        async fn respond(state: Arc<MockState>, url: String) -> DownloadResult<Bytes> {
            let delay = *state.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            {
                let mut failures = state.failures.lock();
                if let Some(left) = failures.get_mut(&url) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(DownloadError::Request {
                            url,
                            reason: "connection reset".to_string(),
                        });
                    }
                }
            }
            state
                .files
                .lock()
                .get(&url)
                .cloned()
                .ok_or(DownloadError::Status { url, status: 404 })
        }
    }

    impl FileFetcher for MockFetcher {
        fn fetch_to_file(
            &self,
            url: String,
            dest: PathBuf,
            on_bytes: ByteSink,
        ) -> BoxFuture<'static, DownloadResult<u64>> {
            let state = Arc::clone(&self.state);
            async move {
                let _guard = InFlight::enter(&state);
                if state.hang.lock().contains(&url) {
                    let _ = tokio::fs::write(&dest, b"partial").await;
                    futures::future::pending::<()>().await;
                }
                let body = Self::respond(Arc::clone(&state), url).await?;
                tokio::fs::write(&dest, &body)
                    .await
                    .map_err(|source| DownloadError::WriteFailed {
                        path: dest.clone(),
                        source,
                    })?;
                on_bytes(body.len() as u64);
                Ok(body.len() as u64)
            }
            .boxed()
        }

        fn fetch_bytes(&self, url: String) -> BoxFuture<'static, DownloadResult<Bytes>> {
            let state = Arc::clone(&self.state);
            async move {
                let _guard = InFlight::enter(&state);
                Self::respond(state, url).await
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_fetch_manifest_decodes_body() {
        use crate::manifest::{encode, ManifestBuilder};

        let manifest = ManifestBuilder::new("remote")
            .version("1.2+7")
            .file(crate::manifest::FileInfo::new("ui", "ui.bundle").with_size(3))
            .build()
            .unwrap();
        let fetcher = MockFetcher::new();
        fetcher.serve("http://cdn/StreamingAssets", encode(&manifest).unwrap());

        let fetched = fetch_manifest(&fetcher, "http://cdn/StreamingAssets", "StreamingAssets")
            .await
            .unwrap();
        assert_eq!(fetched.name(), "StreamingAssets");
        assert_eq!(fetched.version(), "1.2+7");
        assert!(fetched.exists_file("ui"));
    }

    #[tokio::test]
    async fn test_fetch_manifest_reports_status() {
        let fetcher = MockFetcher::new();
        let err = fetch_manifest(&fetcher, "http://cdn/missing", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert!(err.is_network());
    }

    #[test]
    fn test_http_fetcher_builds_with_timeout() {
        let config = DownloaderConfig::new()
            .with_timeout(Some(Duration::from_secs(10)))
            .with_accept_invalid_certs(true);
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(fetcher.timeout, Some(Duration::from_secs(10)));
    }
}

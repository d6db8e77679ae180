//! Patch download sessions.
//!
//! This module fetches the files a manifest lists into a local save
//! directory:
//! - Network access behind the [`FileFetcher`] trait (`fetcher`)
//! - Bounded-concurrency scheduling with pause, stop and retry (`scheduler`)
//! - Atomic progress counters (`progress`)
//! - Sub-patch promotion after a successful session (`promote`)
//!
//! # Architecture
//!
//! ```text
//! PatchDownloader (session)
//!         │
//!         ├── FileFetcher (trait)
//!         │       └── HttpFetcher
//!         │
//!         ├── VecDeque<DownloadTask> ──► FuturesUnordered (≤ max_concurrent)
//!         │
//!         ├── DownloadControl (pause / resume / stop)
//!         │
//!         └── ProgressCounters ──► SessionProgress callback
//! ```
//!
//! # Example
//!
//! ```ignore
//! use patchkit::download::{DownloaderConfig, PatchDownloader};
//!
//! let mut session = PatchDownloader::with_http(
//!     DownloaderConfig::default(),
//!     "/data/patch",
//!     "https://cdn.example.com/patch/",
//! )?;
//! let planned = session.prepare_remote("https://cdn.example.com/patch/StreamingAssets").await?;
//! if planned.needs_download() {
//!     session.run().await?;
//! }
//! ```

mod config;
mod error;
mod fetcher;
mod progress;
mod promote;
mod scheduler;
mod task;

pub use config::{DownloaderConfig, DEFAULT_MAX_CONCURRENT_DOWNLOADS};
pub use error::{DownloadError, DownloadResult};
pub use fetcher::{fetch_manifest, ByteSink, FileFetcher, HttpFetcher};
pub use progress::{ProgressCallback, ProgressCounters, SessionProgress};
pub use promote::promote_sub_patches;
pub use scheduler::{DownloadControl, DownloadEvent, EventCallback, PatchDownloader, SessionState};
pub use task::{DownloadTask, TaskState};

#[cfg(test)]
pub(crate) use fetcher::tests::MockFetcher;

//! Integration tests for the full patch delivery path.
//!
//! These tests verify the flow a shipping application goes through:
//! - A producer packs a directory into a manifest
//! - A download session mirrors the published files locally
//! - The search path serves bundles and assets from the downloaded layer
//! - Removing the layer unloads everything it served
//!
//! Run with: `cargo test --test patch_delivery_integration`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tempfile::TempDir;

use patchkit::bundle::{
    cipher, BundleCache, CacheConfig, DecodeError, DecodedPackage, PackageDecoder,
};
use patchkit::download::{
    ByteSink, DownloadError, DownloadResult, DownloaderConfig, FileFetcher, PatchDownloader,
    SessionState,
};
use patchkit::manifest::{encode, save_manifest, DependencyGraph, ManifestBuilder};
use patchkit::overlay::ManifestOverlay;

// ============================================================================
// Helper Types
// ============================================================================

/// Serves `{root}/{path}` for URLs of the form `mem://cdn/{path}`.
struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    fn resolve(&self, url: &str) -> DownloadResult<PathBuf> {
        url.strip_prefix("mem://cdn/")
            .map(|path| self.root.join(path))
            .ok_or_else(|| DownloadError::Request {
                url: url.to_string(),
                reason: "unknown host".to_string(),
            })
    }
}

impl FileFetcher for DirectoryFetcher {
    fn fetch_to_file(
        &self,
        url: String,
        dest: PathBuf,
        on_bytes: ByteSink,
    ) -> BoxFuture<'static, DownloadResult<u64>> {
        let source = self.resolve(&url);
        async move {
            let body = tokio::fs::read(source?)
                .await
                .map_err(|_| DownloadError::Status { url, status: 404 })?;
            tokio::fs::write(&dest, &body)
                .await
                .map_err(|source| DownloadError::WriteFailed { path: dest, source })?;
            on_bytes(body.len() as u64);
            Ok(body.len() as u64)
        }
        .boxed()
    }

    fn fetch_bytes(&self, url: String) -> BoxFuture<'static, DownloadResult<Bytes>> {
        let source = self.resolve(&url);
        async move {
            tokio::fs::read(source?)
                .await
                .map(Bytes::from)
                .map_err(|_| DownloadError::Status { url, status: 404 })
        }
        .boxed()
    }
}

/// Bundle payloads are newline-separated asset paths.
struct AssetListDecoder;

impl PackageDecoder for AssetListDecoder {
    fn decode(&self, name: &str, bytes: Bytes) -> Result<DecodedPackage, DecodeError> {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| DecodeError(format!("{} is not an asset list", name)))?;
        let assets = text.lines().map(str::to_string).collect();
        Ok(DecodedPackage::new(assets, bytes.clone()))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const UI_KEY: &str = "ui-bundle-key";

/// Publishes `common` (plain) and `ui` (encrypted, depends on `common`)
/// with their manifest into `server`.
fn publish(server: &Path, version: &str) {
    std::fs::write(server.join("common"), "assets/common/font.ttf\n").unwrap();
    let ui = cipher::encrypt(
        b"assets/ui/hud.prefab\nassets/ui/menu.prefab\n".to_vec(),
        UI_KEY,
    );
    std::fs::write(server.join("ui"), ui).unwrap();

    let mut graph = DependencyGraph::new();
    graph.add_bundle("common", "", vec![]);
    graph.add_bundle("ui", UI_KEY, vec!["common".to_string()]);

    let manifest = ManifestBuilder::new("StreamingAssets")
        .version(version)
        .graph(graph)
        .add_directory(server)
        .unwrap()
        .build()
        .unwrap();
    // written after packing so the manifest does not list itself
    std::fs::write(server.join("StreamingAssets"), encode(&manifest).unwrap()).unwrap();
}

fn session(server: &Path, client: &Path) -> PatchDownloader {
    let fetcher = Arc::new(DirectoryFetcher {
        root: server.to_path_buf(),
    });
    PatchDownloader::new(fetcher, DownloaderConfig::default(), client, "mem://cdn/")
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Download a published manifest, then load an encrypted bundle with its
/// dependency through the search path.
#[tokio::test]
async fn test_download_then_load_through_search_path() {
    let server = TempDir::new().unwrap();
    let client = TempDir::new().unwrap();
    publish(server.path(), "1.0+3");

    let mut downloader = session(server.path(), client.path());
    let planned = downloader
        .prepare_remote("mem://cdn/StreamingAssets")
        .await
        .unwrap();
    assert_eq!(planned.total_task_count, 2);
    assert_eq!(downloader.run().await.unwrap(), SessionState::Succeeded);

    let cache = BundleCache::new(
        CacheConfig::new(client.path()),
        Arc::new(AssetListDecoder),
    );
    let mut overlay = ManifestOverlay::new(cache.clone());
    assert!(overlay.add_search_path("StreamingAssets", true).unwrap());
    assert_eq!(overlay.running_version(), "1.0+3");

    let (ui, path) = overlay.load_asset("ui", "hud").unwrap();
    assert_eq!(path, "assets/ui/hud.prefab");
    assert_eq!(cache.snapshot(ui).unwrap().dependencies, vec!["common"]);

    let common = cache.handle("common").unwrap();
    assert_eq!(cache.snapshot(common).unwrap().ref_count, 1);
    assert_eq!(cache.live_count(), 2);

    // releasing the bundle cascades to its dependency
    overlay.release_bundle("ui").unwrap();
    assert_eq!(cache.live_count(), 0);
}

/// A second session against an unchanged server downloads nothing.
#[tokio::test]
async fn test_second_session_is_up_to_date() {
    let server = TempDir::new().unwrap();
    let client = TempDir::new().unwrap();
    publish(server.path(), "1.0+3");

    let mut first = session(server.path(), client.path());
    first.prepare_remote("mem://cdn/StreamingAssets").await.unwrap();
    first.run().await.unwrap();

    let mut second = session(server.path(), client.path());
    let planned = second
        .prepare_remote("mem://cdn/StreamingAssets")
        .await
        .unwrap();
    assert!(!planned.needs_download());
}

/// A patch layer in front of the base layer wins, and removing it falls
/// back to the base and unloads the patch's bundles.
#[tokio::test]
async fn test_patch_layer_overrides_base_until_removed() {
    let server = TempDir::new().unwrap();
    let client = TempDir::new().unwrap();
    publish(server.path(), "1.0+3");

    let mut downloader = session(server.path(), client.path());
    downloader
        .prepare_remote("mem://cdn/StreamingAssets")
        .await
        .unwrap();
    downloader.run().await.unwrap();

    std::fs::write(client.path().join("ui.hotfix"), "assets/ui/hud.prefab\n").unwrap();
    let mut graph = DependencyGraph::new();
    graph.add_bundle("ui", "", vec![]);
    let patch = ManifestBuilder::new("hotfix")
        .version("1.0+4")
        .graph(graph)
        .file(patchkit::manifest::FileInfo::new("ui", "ui.hotfix"))
        .build()
        .unwrap();
    save_manifest(&client.path().join("hotfix"), &patch).unwrap();

    let cache = BundleCache::new(
        CacheConfig::new(client.path()),
        Arc::new(AssetListDecoder),
    );
    let mut overlay = ManifestOverlay::new(cache.clone());
    overlay.add_search_path("StreamingAssets", false).unwrap();
    overlay.add_search_path("hotfix", true).unwrap();

    assert_eq!(overlay.resolve_bundle("ui").unwrap().name(), "hotfix");
    let ui = overlay.load_bundle("ui").unwrap();
    assert_eq!(cache.snapshot(ui).unwrap().tag, "hotfix");

    assert!(overlay.remove_search_path("hotfix"));
    assert!(cache.handle("ui").is_none());
    assert_eq!(
        overlay.resolve_bundle("ui").unwrap().name(),
        "StreamingAssets"
    );
}

//! On-demand sub-patch checks.

use std::path::Path;
use std::sync::Arc;

use crate::download::{fetch_manifest, DownloadResult, DownloaderConfig, FileFetcher, PatchDownloader};
use crate::manifest::{check_resource_version, load_manifest, save_manifest, CheckResult, Manifest};

/// A sub-patch to bring up to date.
#[derive(Debug, Clone, Copy)]
pub struct PatchRequest<'a> {
    /// Logical name; the patch manifest lives at `{save_path}/{name}`.
    pub name: &'a str,
    pub url_prefix: &'a str,
    pub manifest_url: &'a str,
    /// Version the caller expects, if it knows one.
    pub target_version: Option<&'a str>,
}

/// What the local copy alone says about a sub-patch.
///
/// `NeedCheck` means the remote manifest must be consulted.
pub fn local_patch_decision(local_version: &str, target_version: Option<&str>) -> CheckResult {
    if local_version.is_empty() {
        return CheckResult::DownloadPatches;
    }
    match target_version.filter(|t| !t.is_empty()) {
        None => CheckResult::NeedCheck,
        Some(target) if check_resource_version(local_version, target) == CheckResult::Nothing => {
            CheckResult::Nothing
        }
        Some(_) => CheckResult::DownloadPatches,
    }
}

/// Decides whether a sub-patch must be fetched and prepares the session.
///
/// Returns a prepared downloader when files are missing, and `None` when
/// the local copy is complete. A remote manifest that is newer but whose
/// files are all present already is saved in place without a session.
pub async fn check_download_patch(
    fetcher: Arc<dyn FileFetcher>,
    config: DownloaderConfig,
    save_path: &Path,
    request: &PatchRequest<'_>,
) -> DownloadResult<Option<PatchDownloader>> {
    if request.url_prefix.is_empty() {
        return Ok(None);
    }

    let local_path = save_path.join(request.name);
    let local = load_manifest(&local_path).unwrap_or_else(|e| {
        tracing::warn!(path = %local_path.display(), error = %e, "unreadable sub-patch manifest");
        Manifest::empty(request.name)
    });
    let decision = local_patch_decision(local.version(), request.target_version);
    tracing::debug!(patch = %request.name, local = %local.version(), %decision, "checked local sub-patch");

    let mut downloader = PatchDownloader::new(
        Arc::clone(&fetcher),
        config.with_manifest_name(request.name),
        save_path,
        request.url_prefix,
    );

    if decision == CheckResult::Nothing {
        let planned = downloader.prepare(Arc::new(local)).await?;
        return Ok(planned.needs_download().then_some(downloader));
    }

    let remote = fetch_manifest(fetcher.as_ref(), request.manifest_url, request.name).await?;
    let newer = match decision {
        CheckResult::NeedCheck => {
            check_resource_version(local.version(), remote.version()) != CheckResult::Nothing
        }
        _ => true,
    };
    let chosen = if newer { remote } else { local };

    let planned = downloader.prepare(Arc::new(chosen)).await?;
    if planned.needs_download() {
        return Ok(Some(downloader));
    }
    if newer {
        if let Some(manifest) = downloader.manifest() {
            save_manifest(&local_path, manifest)?;
            tracing::info!(patch = %request.name, version = %manifest.version(), "sub-patch manifest updated");
        }
    }
    Ok(None)
}

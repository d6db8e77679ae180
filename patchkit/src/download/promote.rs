//! Sub-patch promotion.
//!
//! A sub-patch is a manifest shipped as an ordinary file. After a session
//! succeeds it is copied to its logical name in the save path, where the
//! search path picks it up as a layer.

use std::path::Path;

use super::error::{DownloadError, DownloadResult};
use crate::manifest::{check_resource_version, load_manifest, CheckResult, Manifest};

/// Copies each downloaded sub-patch of `manifest` to `{save_path}/{name}`.
///
/// An existing copy whose embedded version is already current is left in
/// place. Returns the names that were copied.
pub fn promote_sub_patches(save_path: &Path, manifest: &Manifest) -> DownloadResult<Vec<String>> {
    let mut promoted = Vec::new();

    for sub_patch in manifest.sub_patches() {
        let Some(info) = manifest.file_info(sub_patch) else {
            tracing::warn!(sub_patch = %sub_patch, "sub-patch has no file entry");
            continue;
        };

        let src = save_path.join(&info.file_name);
        let dest = save_path.join(sub_patch);
        if src == dest {
            continue;
        }
        if !src.is_file() {
            tracing::warn!(path = %src.display(), "sub-patch file missing");
            continue;
        }

        if dest.exists() && is_current(&src, &dest, manifest) {
            tracing::debug!(sub_patch = %sub_patch, "sub-patch already current");
            continue;
        }

        std::fs::copy(&src, &dest).map_err(|source| DownloadError::WriteFailed {
            path: dest.clone(),
            source,
        })?;
        tracing::info!(sub_patch = %sub_patch, from = %info.file_name, "promoted sub-patch");
        promoted.push(sub_patch.clone());
    }

    Ok(promoted)
}

/// Whether `dest` already embeds a version at least as new as `src`.
///
/// A source without a readable version is compared using the owning
/// manifest's version. An unreadable destination is never current.
fn is_current(src: &Path, dest: &Path, owner: &Manifest) -> bool {
    let existing = match load_manifest(dest) {
        Ok(m) if !m.version().is_empty() => m,
        _ => return false,
    };
    let source_version = load_manifest(src)
        .ok()
        .map(|m| m.version().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| owner.version().to_string());

    check_resource_version(existing.version(), &source_version) == CheckResult::Nothing
}

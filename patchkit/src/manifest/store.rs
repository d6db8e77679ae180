//! Reading and writing manifest files on local storage.

use std::path::Path;

use super::codec;
use super::error::{ManifestError, ManifestResult};
use super::types::Manifest;

/// Loads the manifest at `path`, named after the file.
///
/// A missing file is not an error: it yields an empty manifest, the same as
/// an absent buffer.
pub fn load_manifest(path: &Path) -> ManifestResult<Manifest> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match std::fs::read(path) {
        Ok(bytes) => codec::decode(&name, &bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "manifest not found, using empty manifest");
            Ok(Manifest::empty(name))
        }
        Err(e) => Err(ManifestError::io(path, e)),
    }
}

/// Writes `manifest` to `path`.
///
/// The bytes go to a sibling temp file that is then renamed over `path`, so
/// a reader never observes a half-written manifest.
pub fn save_manifest(path: &Path, manifest: &Manifest) -> ManifestResult<()> {
    let bytes = codec::encode(manifest)?;
    write_atomic(path, &bytes)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> ManifestResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, bytes).map_err(|e| ManifestError::io(&temp_path, e))?;
    std::fs::rename(&temp_path, path).map_err(|e| ManifestError::io(path, e))?;
    Ok(())
}

//! Human-readable JSON listing of a manifest's files.
//!
//! Written next to the manifest as `{name}_files.manifest` for debugging and
//! tooling. Nothing at runtime reads it back.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use super::error::ManifestResult;
use super::store::write_atomic;
use super::types::{FileInfo, Manifest};

/// Suffix appended to the manifest name for the listing file.
pub const LISTING_SUFFIX: &str = "_files.manifest";

#[derive(Debug, Serialize)]
struct Listing<'a> {
    name: &'a str,
    version: &'a str,
    tag: &'a str,
    generated_at: String,
    total_size: u64,
    sub_patches: &'a [String],
    files: &'a [FileInfo],
}

/// Renders the listing as pretty-printed JSON.
pub fn render_listing(manifest: &Manifest) -> ManifestResult<String> {
    let listing = Listing {
        name: manifest.name(),
        version: manifest.version(),
        tag: manifest.tag(),
        generated_at: Utc::now().to_rfc3339(),
        total_size: manifest.total_size(),
        sub_patches: manifest.sub_patches(),
        files: manifest.files(),
    };
    Ok(serde_json::to_string_pretty(&listing)?)
}

/// Writes `{dir}/{name}_files.manifest` and returns its path.
pub fn write_file_listing(manifest: &Manifest, dir: &Path) -> ManifestResult<PathBuf> {
    let path = dir.join(format!("{}{}", manifest.name(), LISTING_SUFFIX));
    let json = render_listing(manifest)?;
    write_atomic(&path, json.as_bytes())?;
    Ok(path)
}

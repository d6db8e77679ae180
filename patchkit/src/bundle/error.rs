//! Error types for bundle loading and the reference cache.

use std::path::PathBuf;

use thiserror::Error;

use super::handle::HandleId;
use crate::manifest::ManifestError;

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;

/// Errors raised by the bundle cache and the search path on top of it.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The handle refers to a slot that has since been reused.
    #[error("stale bundle handle {0}")]
    StaleHandle(HandleId),

    /// The manifest that declares the bundle has no file entry for it.
    #[error("manifest '{manifest}' has no file entry for bundle '{bundle}'")]
    MissingFileInfo { bundle: String, manifest: String },

    /// No search layer declares the bundle.
    #[error("bundle '{0}' not found in any search layer")]
    BundleNotFound(String),

    /// A declared dependency could not be resolved or loaded.
    #[error("bundle '{bundle}' is missing dependency '{dependency}'")]
    MissingDependency { bundle: String, dependency: String },

    /// No search layer has the bundle with the requested asset.
    #[error("asset '{asset}' not found in bundle '{bundle}'")]
    AssetNotFound { bundle: String, asset: String },

    /// Reading or decoding the bundle produced no content.
    #[error("bundle '{0}' failed to load")]
    LoadFailed(String),

    /// The handle was unloaded before the load completed.
    #[error("bundle '{0}' was unloaded")]
    Released(String),

    /// A search layer's manifest could not be read.
    #[error("failed to load search path {path}: {source}")]
    SearchPath {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },
}

//! Path-addressed resources.
//!
//! A resource path `dir/.../name` lives in the bundle `res_<dir>`; a path
//! without a directory lives in `res_resources`. Paths are case-insensitive.

use super::ManifestOverlay;
use crate::bundle::{BundleError, BundleResult, HandleId};

/// Bundle holding resources that sit directly under the resources root.
pub const ROOT_RESOURCE_BUNDLE: &str = "res_resources";

/// Bundle that stores the resource at `path`.
pub fn resource_bundle_name(path: &str) -> String {
    match path.split_once('/') {
        Some((dir, _)) => format!("res_{}", dir.to_lowercase()),
        None => ROOT_RESOURCE_BUNDLE.to_string(),
    }
}

impl ManifestOverlay {
    /// Loads the resource at `path` and returns the retained bundle handle
    /// with the asset's full path.
    pub fn load_resource(&self, path: &str) -> BundleResult<(HandleId, String)> {
        let path = path.to_lowercase();
        self.load_asset(&resource_bundle_name(&path), &path)
    }

    pub async fn load_resource_async(&self, path: &str) -> BundleResult<(HandleId, String)> {
        let path = path.to_lowercase();
        self.load_asset_async(&resource_bundle_name(&path), &path).await
    }

    /// Loads `bundle` and lists every asset it holds. The bundle is retained.
    pub fn load_all_assets(&self, bundle: &str) -> BundleResult<(HandleId, Vec<String>)> {
        let id = self.load_bundle(bundle)?;
        let assets = self
            .cache()
            .package(id)
            .map(|package| package.asset_names().to_vec())
            .ok_or_else(|| BundleError::BundleNotFound(bundle.to_string()))?;
        Ok((id, assets))
    }
}

//! Priority-ordered manifest layers over a shared bundle cache.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;

use crate::bundle::{BundleCache, BundleError, BundleResult, HandleId};
use crate::manifest::{load_manifest, Manifest};

/// Ordered stack of manifests; index 0 is searched first.
///
/// Resolution results are memoized and the memos are dropped whenever the
/// layer list changes. Bundle handles are tagged with the name of the layer
/// that served them, so removing a layer unloads exactly its bundles.
pub struct ManifestOverlay {
    layers: Vec<Arc<Manifest>>,
    base: Option<Arc<Manifest>>,
    cache: BundleCache,
    bundle_memo: DashMap<String, Option<Arc<Manifest>>>,
    asset_memo: DashMap<String, Option<Arc<Manifest>>>,
    dependency_memo: DashMap<(String, String), Arc<Vec<String>>>,
}

impl ManifestOverlay {
    pub fn new(cache: BundleCache) -> Self {
        Self {
            layers: Vec::new(),
            base: None,
            cache,
            bundle_memo: DashMap::new(),
            asset_memo: DashMap::new(),
            dependency_memo: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    pub fn layers(&self) -> &[Arc<Manifest>] {
        &self.layers
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    // =========================================================================
    // Layer management
    // =========================================================================

    /// Drops every layer and bundle, then installs `base` as the only layer.
    pub fn init(&mut self, base: Manifest) {
        self.reset();
        let base = Arc::new(base);
        tracing::info!(manifest = %base.name(), version = %base.version(), "initialized search path");
        self.layers.push(Arc::clone(&base));
        self.base = Some(base);
    }

    /// Unloads all bundles and removes all layers.
    pub fn reset(&mut self) {
        self.cache.unload_all();
        self.layers.clear();
        self.base = None;
        self.invalidate();
    }

    /// Adds a layer at the front (highest priority) or the back.
    ///
    /// A layer with the same name is replaced, unloading its bundles.
    pub fn add_layer(&mut self, manifest: Manifest, front: bool) {
        if self.layers.iter().any(|m| m.name() == manifest.name()) {
            self.remove_layer(manifest.name());
        }
        tracing::info!(
            manifest = %manifest.name(),
            version = %manifest.version(),
            front,
            "added search layer"
        );
        let manifest = Arc::new(manifest);
        if front {
            self.layers.insert(0, manifest);
        } else {
            self.layers.push(manifest);
        }
        self.invalidate();
    }

    /// Removes the named layer and unloads every bundle it served.
    pub fn remove_layer(&mut self, name: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|m| m.name() != name);
        if self.layers.len() == before {
            return false;
        }
        let unloaded = self.cache.unload_with_tag(name);
        tracing::info!(manifest = %name, unloaded, "removed search layer");
        self.invalidate();
        true
    }

    /// Loads `{storage_root}/{name}` and adds it as a layer.
    ///
    /// Returns false if no manifest exists there.
    pub fn add_search_path(&mut self, name: &str, front: bool) -> BundleResult<bool> {
        let path = self.cache.storage_root().join(name);
        let manifest = load_manifest(&path).map_err(|source| BundleError::SearchPath {
            path: path.clone(),
            source,
        })?;
        if manifest.is_empty() {
            tracing::warn!(path = %path.display(), "search path has no manifest");
            return Ok(false);
        }
        self.add_layer(manifest, front);
        Ok(true)
    }

    /// Removes the layer added by [`add_search_path`](Self::add_search_path).
    pub fn remove_search_path(&mut self, name: &str) -> bool {
        self.remove_layer(name)
    }

    fn invalidate(&self) {
        self.bundle_memo.clear();
        self.asset_memo.clear();
        self.dependency_memo.clear();
    }

    /// Version of the front layer, falling back to the base manifest.
    pub fn running_version(&self) -> String {
        self.layers
            .first()
            .map(|m| m.version())
            .filter(|v| !v.is_empty())
            .or_else(|| self.base.as_ref().map(|m| m.version()))
            .unwrap_or_default()
            .to_string()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// First layer that declares `bundle`.
    pub fn resolve_bundle(&self, bundle: &str) -> Option<Arc<Manifest>> {
        if let Some(hit) = self.bundle_memo.get(bundle) {
            return hit.value().clone();
        }
        let found = self
            .layers
            .iter()
            .find(|m| m.exists_bundle(bundle))
            .cloned();
        self.bundle_memo.insert(bundle.to_string(), found.clone());
        found
    }

    /// First layer whose copy of `bundle` actually contains `asset`.
    ///
    /// Each candidate is loaded to look inside it, because layers may declare
    /// the same bundle name with different contents.
    pub fn resolve_bundle_with_asset(&self, bundle: &str, asset: &str) -> Option<Arc<Manifest>> {
        let key = format!("{}?{}", bundle, asset);
        if let Some(hit) = self.asset_memo.get(&key) {
            return hit.value().clone();
        }

        let found = self
            .layers
            .iter()
            .filter(|m| m.exists_bundle(bundle))
            .find(|m| match self.load_handle_sync(bundle, m) {
                Ok(id) => self.cache.contains_asset(id, asset).unwrap_or(false),
                Err(e) => {
                    tracing::debug!(bundle = %bundle, layer = %m.name(), error = %e, "candidate layer failed to load");
                    false
                }
            })
            .cloned();
        self.asset_memo.insert(key, found.clone());
        found
    }

    /// [`resolve_bundle_with_asset`](Self::resolve_bundle_with_asset) with
    /// candidates loaded asynchronously. Shares the same memo.
    pub async fn resolve_bundle_with_asset_async(
        &self,
        bundle: &str,
        asset: &str,
    ) -> Option<Arc<Manifest>> {
        let key = format!("{}?{}", bundle, asset);
        if let Some(hit) = self.asset_memo.get(&key) {
            return hit.value().clone();
        }

        let mut found = None;
        for candidate in self.layers.iter().filter(|m| m.exists_bundle(bundle)) {
            match self.load_handle_async(bundle, candidate).await {
                Ok(id) if self.cache.contains_asset(id, asset).unwrap_or(false) => {
                    found = Some(Arc::clone(candidate));
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(bundle = %bundle, layer = %candidate.name(), error = %e, "candidate layer failed to load");
                }
            }
        }
        self.asset_memo.insert(key, found.clone());
        found
    }

    /// Transitive dependencies of `bundle` within `manifest`, leaves first.
    pub fn resolve_dependencies(&self, bundle: &str, manifest: &Manifest) -> Arc<Vec<String>> {
        let key = (manifest.name().to_string(), bundle.to_string());
        if let Some(hit) = self.dependency_memo.get(&key) {
            return Arc::clone(hit.value());
        }
        let deps = Arc::new(manifest.dependencies(bundle));
        self.dependency_memo.insert(key, Arc::clone(&deps));
        deps
    }

    pub fn real_name(&self, bundle: &str, manifest: &Manifest) -> String {
        manifest.real_name(bundle).to_string()
    }

    pub fn exists_bundle(&self, bundle: &str) -> bool {
        self.resolve_bundle(bundle).is_some()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Handle for `bundle` as served by `manifest`; new handles are
    /// auto-released so their lifetime follows their references.
    fn handle_for(&self, bundle: &str, manifest: &Manifest) -> BundleResult<HandleId> {
        let real = manifest.real_name(bundle);
        let info = manifest
            .file_info(real)
            .ok_or_else(|| BundleError::MissingFileInfo {
                bundle: real.to_string(),
                manifest: manifest.name().to_string(),
            })?;
        let (id, created) = self.cache.get_or_create(real, info, manifest.name());
        if created {
            self.cache.auto_release(id)?;
        }
        Ok(id)
    }

    fn dependency_handles(
        &self,
        bundle: &str,
        manifest: &Arc<Manifest>,
    ) -> BundleResult<Vec<(String, HandleId)>> {
        let deps = self.resolve_dependencies(bundle, manifest);
        deps.iter()
            .map(|dep| {
                let owner = self
                    .resolve_bundle(dep)
                    .unwrap_or_else(|| Arc::clone(manifest));
                self.handle_for(dep, &owner)
                    .map(|id| (dep.clone(), id))
                    .map_err(|_| BundleError::MissingDependency {
                        bundle: bundle.to_string(),
                        dependency: dep.clone(),
                    })
            })
            .collect()
    }

    /// Loads `bundle` from `manifest` after all of its dependencies.
    fn load_handle_sync(&self, bundle: &str, manifest: &Arc<Manifest>) -> BundleResult<HandleId> {
        let id = self.handle_for(bundle, manifest)?;
        let deps = self.dependency_handles(bundle, manifest)?;
        for (dep, dep_id) in &deps {
            if !self.cache.load_sync(*dep_id)?.is_loaded() {
                return Err(BundleError::MissingDependency {
                    bundle: bundle.to_string(),
                    dependency: dep.clone(),
                });
            }
        }
        self.attach_dependencies(id, &deps)?;
        self.cache
            .load_sync(id)?
            .into_result(manifest.real_name(bundle))?;
        Ok(id)
    }

    fn attach_dependencies(&self, id: HandleId, deps: &[(String, HandleId)]) -> BundleResult<()> {
        if !self.cache.has_dependencies(id)? {
            let ids: Vec<HandleId> = deps.iter().map(|(_, id)| *id).collect();
            self.cache.set_dependencies(id, &ids)?;
        }
        Ok(())
    }

    /// Loads `bundle` and its dependencies synchronously and retains it.
    pub fn load_bundle(&self, bundle: &str) -> BundleResult<HandleId> {
        let manifest = self
            .resolve_bundle(bundle)
            .ok_or_else(|| BundleError::BundleNotFound(bundle.to_string()))?;
        let id = self.load_handle_sync(bundle, &manifest)?;
        self.cache.retain(id)?;
        Ok(id)
    }

    /// Loads `bundle` without blocking: all dependencies are awaited
    /// before the bundle's own load starts. The bundle is retained.
    pub async fn load_bundle_async(&self, bundle: &str) -> BundleResult<HandleId> {
        let manifest = self
            .resolve_bundle(bundle)
            .ok_or_else(|| BundleError::BundleNotFound(bundle.to_string()))?;
        let id = self.load_handle_async(bundle, &manifest).await?;
        self.cache.retain(id)?;
        Ok(id)
    }

    async fn load_handle_async(&self, bundle: &str, manifest: &Arc<Manifest>) -> BundleResult<HandleId> {
        let id = self.handle_for(bundle, manifest)?;
        let deps = self.dependency_handles(bundle, manifest)?;

        let outcomes = join_all(deps.iter().map(|(_, dep_id)| self.cache.load_async(*dep_id))).await;
        for ((dep, _), outcome) in deps.iter().zip(outcomes) {
            if !outcome?.is_loaded() {
                return Err(BundleError::MissingDependency {
                    bundle: bundle.to_string(),
                    dependency: dep.clone(),
                });
            }
        }
        self.attach_dependencies(id, &deps)?;

        self.cache
            .load_async(id)
            .await?
            .into_result(manifest.real_name(bundle))?;
        Ok(id)
    }

    /// Loads the layer's bundle containing `asset` and returns the retained
    /// handle with the asset's full path.
    pub fn load_asset(&self, bundle: &str, asset: &str) -> BundleResult<(HandleId, String)> {
        let not_found = || BundleError::AssetNotFound {
            bundle: bundle.to_string(),
            asset: asset.to_string(),
        };
        let manifest = self
            .resolve_bundle_with_asset(bundle, asset)
            .ok_or_else(not_found)?;
        let id = self.load_handle_sync(bundle, &manifest)?;
        let path = self
            .cache
            .find_asset_path(id, asset)?
            .ok_or_else(not_found)?;
        self.cache.retain(id)?;
        Ok((id, path))
    }

    /// Async form of [`load_asset`](Self::load_asset).
    pub async fn load_asset_async(
        &self,
        bundle: &str,
        asset: &str,
    ) -> BundleResult<(HandleId, String)> {
        let not_found = || BundleError::AssetNotFound {
            bundle: bundle.to_string(),
            asset: asset.to_string(),
        };
        let manifest = self
            .resolve_bundle_with_asset_async(bundle, asset)
            .await
            .ok_or_else(not_found)?;
        let id = self.load_handle_async(bundle, &manifest).await?;
        let path = self
            .cache
            .find_asset_path(id, asset)?
            .ok_or_else(not_found)?;
        self.cache.retain(id)?;
        Ok((id, path))
    }

    fn live_handle(&self, bundle: &str) -> BundleResult<HandleId> {
        self.resolve_bundle(bundle)
            .and_then(|m| self.cache.handle(m.real_name(bundle)))
            .ok_or_else(|| BundleError::BundleNotFound(bundle.to_string()))
    }

    pub fn release_bundle(&self, bundle: &str) -> BundleResult<()> {
        self.cache.release(self.live_handle(bundle)?)
    }

    pub fn dont_release_bundle(&self, bundle: &str) -> BundleResult<()> {
        self.cache.dont_release(self.live_handle(bundle)?)
    }

    /// Unloads every bundle while keeping the layers.
    pub fn release_all(&self) {
        self.cache.unload_all();
        self.asset_memo.clear();
    }
}

impl std::fmt::Debug for ManifestOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestOverlay")
            .field("layers", &self.layer_names())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{AssetListDecoder, CacheConfig, HandleState};
    use crate::manifest::{DependencyGraph, FileInfo, ManifestBuilder};
    use std::path::Path;
    use tempfile::TempDir;

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Builds a layer whose bundles are stored as `{layer}_{bundle}`.
    /// Dependencies are comma-separated; assets are newline-separated.
    fn layer(dir: &Path, name: &str, version: &str, bundles: &[(&str, &str, &str)]) -> Manifest {
        let mut graph = DependencyGraph::new();
        let mut builder = ManifestBuilder::new(name).version(version);
        for (bundle, deps, assets) in bundles {
            let deps = deps
                .split(',')
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
            graph.add_bundle(*bundle, "", deps);
            let file_name = format!("{}_{}", name, bundle);
            std::fs::write(dir.join(&file_name), assets).unwrap();
            builder = builder.file(FileInfo::new(*bundle, file_name));
        }
        builder.graph(graph).build().unwrap()
    }

    fn overlay_in(dir: &Path) -> ManifestOverlay {
        let cache = BundleCache::new(CacheConfig::new(dir), Arc::new(AssetListDecoder));
        ManifestOverlay::new(cache)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[test]
    fn test_front_layer_wins_and_removal_falls_through() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "L2", "1.0+1", &[("b", "", "assets/b.asset")]));
        overlay.add_layer(layer(dir.path(), "L1", "1.0+2", &[("b", "", "assets/b.asset")]), true);

        assert_eq!(overlay.resolve_bundle("b").unwrap().name(), "L1");
        let id = overlay.load_bundle("b").unwrap();
        assert_eq!(overlay.cache().snapshot(id).unwrap().tag, "L1");

        assert!(overlay.remove_layer("L1"));
        assert_eq!(overlay.resolve_bundle("b").unwrap().name(), "L2");
        assert_eq!(overlay.cache().state(id).unwrap(), HandleState::Released);
    }

    #[test]
    fn test_missing_bundle_resolves_to_none() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[("a", "", "assets/a")]));
        assert!(overlay.resolve_bundle("zzz").is_none());
        assert!(matches!(
            overlay.load_bundle("zzz"),
            Err(BundleError::BundleNotFound(_))
        ));
    }

    #[test]
    fn test_asset_resolution_skips_layers_without_asset() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[("ui", "", "assets/ui/menu.prefab")]));
        overlay.add_layer(
            layer(dir.path(), "patch", "1.0+1", &[("ui.patch", "", "assets/ui/hud.prefab")]),
            true,
        );

        assert_eq!(
            overlay.resolve_bundle_with_asset("ui", "menu").unwrap().name(),
            "base"
        );
        assert_eq!(
            overlay.resolve_bundle_with_asset("ui", "hud").unwrap().name(),
            "patch"
        );
        assert!(overlay.resolve_bundle_with_asset("ui", "credits").is_none());
    }

    #[test]
    fn test_memo_is_invalidated_by_layer_changes() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[("a", "", "assets/a")]));
        assert_eq!(overlay.resolve_bundle("a").unwrap().name(), "base");

        overlay.add_layer(layer(dir.path(), "hot", "1.0+1", &[("a", "", "assets/a")]), true);
        assert_eq!(overlay.resolve_bundle("a").unwrap().name(), "hot");
    }

    #[test]
    fn test_running_version_prefers_front_layer() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[]));
        assert_eq!(overlay.running_version(), "1.0+0");
        overlay.add_layer(layer(dir.path(), "patch", "1.0+4", &[]), true);
        assert_eq!(overlay.running_version(), "1.0+4");
        overlay.add_layer(layer(dir.path(), "blank", "", &[]), true);
        assert_eq!(overlay.running_version(), "1.0+0");
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn test_load_bundle_loads_and_retains_dependencies() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(
            dir.path(),
            "base",
            "1.0+0",
            &[
                ("ui", "atlas", "assets/ui/hud.prefab"),
                ("atlas", "shaders", "assets/atlas.png"),
                ("shaders", "", "assets/shaders/ui.shader"),
            ],
        ));

        let id = overlay.load_bundle("ui").unwrap();
        let cache = overlay.cache();
        let snapshot = cache.snapshot(id).unwrap();
        assert_eq!(snapshot.state, HandleState::Loaded);
        assert_eq!(snapshot.ref_count, 1);
        assert_eq!(snapshot.dependencies, vec!["shaders", "atlas"]);

        let atlas = cache.handle("atlas").unwrap();
        assert_eq!(cache.state(atlas).unwrap(), HandleState::Loaded);
        assert_eq!(cache.snapshot(atlas).unwrap().ref_count, 1);

        overlay.release_bundle("ui").unwrap();
        assert_eq!(cache.live_count(), 0);
    }

    #[test]
    fn test_missing_dependency_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        let mut graph = DependencyGraph::new();
        graph.add_bundle("ui", "", vec!["ghost".into()]);
        std::fs::write(dir.path().join("ui_file"), "assets/ui").unwrap();
        let manifest = ManifestBuilder::new("base")
            .graph(graph)
            .file(FileInfo::new("ui", "ui_file"))
            .build()
            .unwrap();
        overlay.init(manifest);

        assert!(matches!(
            overlay.load_bundle("ui"),
            Err(BundleError::MissingDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn test_load_asset_returns_full_path() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[("ui", "", "assets/ui/hud.prefab")]));

        let (id, path) = overlay.load_asset("ui", "HUD").unwrap();
        assert_eq!(path, "assets/ui/hud.prefab");
        assert_eq!(overlay.cache().snapshot(id).unwrap().ref_count, 1);

        assert!(matches!(
            overlay.load_asset("ui", "missing"),
            Err(BundleError::AssetNotFound { .. })
        ));
    }

    #[test]
    fn test_dont_release_keeps_bundle_after_release() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[("a", "", "assets/a")]));

        let id = overlay.load_bundle("a").unwrap();
        overlay.dont_release_bundle("a").unwrap();
        overlay.release_bundle("a").unwrap();
        assert_eq!(overlay.cache().state(id).unwrap(), HandleState::Loaded);
    }

    #[tokio::test]
    async fn test_load_bundle_async_loads_dependencies_first() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(
            dir.path(),
            "base",
            "1.0+0",
            &[
                ("ui", "fonts,atlas", "assets/ui/hud.prefab"),
                ("fonts", "", "assets/fonts/main.ttf"),
                ("atlas", "", "assets/atlas.png"),
            ],
        ));

        let id = overlay.load_bundle_async("ui").await.unwrap();
        let cache = overlay.cache();
        assert_eq!(cache.state(id).unwrap(), HandleState::Loaded);
        for dep in ["fonts", "atlas"] {
            let dep_id = cache.handle(dep).unwrap();
            assert_eq!(cache.state(dep_id).unwrap(), HandleState::Loaded);
        }
    }

    #[test]
    fn test_add_search_path_reads_manifest_from_storage() {
        let dir = TempDir::new().unwrap();
        let mut overlay = overlay_in(dir.path());
        overlay.init(layer(dir.path(), "base", "1.0+0", &[]));

        let dlc = layer(dir.path(), "dlc", "1.0+3", &[("extra", "", "assets/extra")]);
        crate::manifest::save_manifest(&dir.path().join("dlc"), &dlc).unwrap();

        assert!(overlay.add_search_path("dlc", true).unwrap());
        assert!(!overlay.add_search_path("absent", true).unwrap());
        assert_eq!(overlay.layer_names(), vec!["dlc", "base"]);
        assert!(overlay.exists_bundle("extra"));
    }
}

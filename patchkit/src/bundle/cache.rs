//! Reference-counted bundle registry.
//!
//! Every live bundle has exactly one slot, found by its real name. A slot
//! counts explicit retains, remembers the handles it depends on (each
//! retained once), and unloads itself when it is auto-released, not pinned,
//! and its count reaches zero.
//!
//! ```text
//!   get_or_create ─▶ Unloaded ─load─▶ Loading ─▶ Loaded | Failed
//!                        │                            │
//!                        └──────── unload ────────────┴─▶ Released ─▶ slot reused
//! ```
//!
//! The registry lock is never held across an await point or while reading
//! and decoding bundle bytes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};

use super::asset::find_asset_path;
use super::cipher;
use super::decoder::{DecodedPackage, PackageDecoder};
use super::error::{BundleError, BundleResult};
use super::handle::{HandleId, HandleSnapshot, HandleState, LoadOutcome};
use crate::manifest::FileInfo;

/// Default number of bundle reads allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 5;

/// Settings for a [`BundleCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding bundle files, named by `FileInfo::file_name`.
    pub storage_root: PathBuf,
    /// Upper bound on concurrent asynchronous reads.
    pub max_concurrent_loads: usize,
}

impl CacheConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
        }
    }

    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max.max(1);
        self
    }
}

// =============================================================================
// Registry internals
// =============================================================================

struct Entry {
    name: String,
    tag: String,
    file_info: FileInfo,
    state: HandleState,
    ref_count: u32,
    auto_release: bool,
    dont_release: bool,
    /// A release dropped the count to zero while loading.
    pending_unload: bool,
    dependencies: Vec<HandleId>,
    has_dependencies: bool,
    package: Option<Arc<DecodedPackage>>,
    asset_paths: HashMap<String, Option<String>>,
    waiters: Vec<oneshot::Sender<LoadOutcome>>,
}

impl Entry {
    fn new(name: String, file_info: FileInfo, tag: String) -> Self {
        Self {
            name,
            tag,
            file_info,
            state: HandleState::Unloaded,
            ref_count: 1,
            auto_release: false,
            dont_release: false,
            pending_unload: false,
            dependencies: Vec::new(),
            has_dependencies: false,
            package: None,
            asset_paths: HashMap::new(),
            waiters: Vec::new(),
        }
    }

    fn should_unload(&self) -> bool {
        self.auto_release && !self.dont_release && self.ref_count == 0
    }

    fn outcome(&self) -> Option<LoadOutcome> {
        match self.state {
            HandleState::Loaded => self.package.clone().map(LoadOutcome::Loaded),
            HandleState::Failed => Some(LoadOutcome::Failed),
            HandleState::Released => Some(LoadOutcome::Released),
            HandleState::Unloaded | HandleState::Loading => None,
        }
    }
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// What to read for a load, captured under the lock.
struct LoadJob {
    name: String,
    path: PathBuf,
    key: String,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Slot>,
    by_name: HashMap<String, HandleId>,
    free: Vec<u32>,
}

impl Registry {
    fn entry(&self, id: HandleId) -> BundleResult<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(BundleError::StaleHandle(id))
    }

    fn entry_mut(&mut self, id: HandleId) -> BundleResult<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(BundleError::StaleHandle(id))
    }

    fn allocate(&mut self, entry: Entry) -> HandleId {
        let name = entry.name.clone();
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.entry = Some(entry);
                HandleId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                HandleId {
                    index,
                    generation: 0,
                }
            }
        };
        self.by_name.insert(name, id);
        id
    }

    /// Decrements `id` and everything its unload releases in turn.
    fn release_cascade(&mut self, mut work: Vec<HandleId>) {
        while let Some(id) = work.pop() {
            let Ok(entry) = self.entry_mut(id) else {
                continue;
            };
            if entry.state == HandleState::Released {
                continue;
            }
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if !entry.should_unload() {
                continue;
            }
            if entry.state == HandleState::Loading {
                entry.pending_unload = true;
                continue;
            }
            work.extend(self.unload_entry(id));
        }
    }

    /// Marks `id` released and returns the dependencies it held.
    fn unload_entry(&mut self, id: HandleId) -> Vec<HandleId> {
        let Ok(entry) = self.entry_mut(id) else {
            return Vec::new();
        };
        if entry.state == HandleState::Released {
            return Vec::new();
        }

        entry.state = HandleState::Released;
        entry.package = None;
        entry.asset_paths.clear();
        entry.pending_unload = false;
        entry.has_dependencies = false;
        let deps = std::mem::take(&mut entry.dependencies);
        for waiter in entry.waiters.drain(..) {
            let _ = waiter.send(LoadOutcome::Released);
        }
        let name = entry.name.clone();
        tracing::debug!(bundle = %name, handle = %id, "unloaded bundle");

        if self.by_name.get(&name) == Some(&id) {
            self.by_name.remove(&name);
        }
        self.free.push(id.index);
        deps
    }

    fn unload(&mut self, id: HandleId) {
        let deps = self.unload_entry(id);
        self.release_cascade(deps);
    }

    /// Subscribes to the load already in flight for `id`, if any.
    fn join_in_flight(
        &mut self,
        id: HandleId,
    ) -> BundleResult<Option<oneshot::Receiver<LoadOutcome>>> {
        let entry = self.entry_mut(id)?;
        if entry.state != HandleState::Loading {
            return Ok(None);
        }
        let (tx, rx) = oneshot::channel();
        entry.waiters.push(tx);
        Ok(Some(rx))
    }

    /// Moves `id` to `Loading` and describes the read, or returns the
    /// outcome of a load that already finished.
    fn begin_load(
        &mut self,
        id: HandleId,
        storage_root: &Path,
    ) -> BundleResult<Result<LoadJob, LoadOutcome>> {
        let entry = self.entry_mut(id)?;
        if let Some(outcome) = entry.outcome() {
            return Ok(Err(outcome));
        }
        entry.state = HandleState::Loading;
        Ok(Ok(LoadJob {
            name: entry.name.clone(),
            path: storage_root.join(&entry.file_info.file_name),
            key: entry.file_info.bundle_hash.clone(),
        }))
    }

    /// Records a load result unless another load already finished first.
    fn finish_load(&mut self, id: HandleId, package: Option<Arc<DecodedPackage>>) -> LoadOutcome {
        let Ok(entry) = self.entry_mut(id) else {
            return LoadOutcome::Released;
        };
        if entry.state != HandleState::Loading {
            return entry.outcome().unwrap_or(LoadOutcome::Failed);
        }

        let outcome = match package {
            Some(package) => {
                entry.state = HandleState::Loaded;
                entry.package = Some(Arc::clone(&package));
                LoadOutcome::Loaded(package)
            }
            None => {
                entry.state = HandleState::Failed;
                LoadOutcome::Failed
            }
        };
        for waiter in entry.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }

        if entry.pending_unload && entry.should_unload() {
            self.unload(id);
        } else {
            entry.pending_unload = false;
        }
        outcome
    }
}

// =============================================================================
// BundleCache
// =============================================================================

/// Shared registry of bundle handles.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct BundleCache {
    registry: Arc<Mutex<Registry>>,
    decoder: Arc<dyn PackageDecoder>,
    config: Arc<CacheConfig>,
    load_permits: Arc<Semaphore>,
}

impl BundleCache {
    pub fn new(config: CacheConfig, decoder: Arc<dyn PackageDecoder>) -> Self {
        let permits = config.max_concurrent_loads.max(1);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            decoder,
            config: Arc::new(config),
            load_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.config.storage_root
    }

    /// Returns the live handle for `name`, creating it if needed.
    ///
    /// The boolean is true when the handle was created by this call. New
    /// handles start `Unloaded` with a count of one.
    pub fn get_or_create(&self, name: &str, file_info: FileInfo, tag: &str) -> (HandleId, bool) {
        let mut registry = self.registry.lock();
        if let Some(&id) = registry.by_name.get(name) {
            return (id, false);
        }
        let id = registry.allocate(Entry::new(name.to_string(), file_info, tag.to_string()));
        tracing::debug!(bundle = %name, tag = %tag, handle = %id, "created bundle handle");
        (id, true)
    }

    /// Live handle registered under `name`.
    pub fn handle(&self, name: &str) -> Option<HandleId> {
        self.registry.lock().by_name.get(name).copied()
    }

    pub fn live_count(&self) -> usize {
        self.registry.lock().by_name.len()
    }

    pub fn retain(&self, id: HandleId) -> BundleResult<()> {
        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id)?;
        if entry.state != HandleState::Released {
            entry.ref_count += 1;
            entry.pending_unload = false;
        }
        Ok(())
    }

    /// Drops one reference; unloads when auto-released and unreferenced.
    pub fn release(&self, id: HandleId) -> BundleResult<()> {
        let mut registry = self.registry.lock();
        registry.entry(id)?;
        registry.release_cascade(vec![id]);
        Ok(())
    }

    /// Hands the creation reference back so the count alone decides the
    /// handle's lifetime. No-op if already auto-released or pinned.
    pub fn auto_release(&self, id: HandleId) -> BundleResult<()> {
        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id)?;
        if entry.auto_release || entry.dont_release || entry.state == HandleState::Released {
            return Ok(());
        }
        entry.auto_release = true;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        Ok(())
    }

    /// Pins the handle so it is never unloaded by releases.
    pub fn dont_release(&self, id: HandleId) -> BundleResult<()> {
        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id)?;
        if entry.dont_release || entry.state == HandleState::Released {
            return Ok(());
        }
        entry.dont_release = true;
        entry.pending_unload = false;
        if entry.auto_release {
            entry.auto_release = false;
            entry.ref_count += 1;
        }
        Ok(())
    }

    /// Replaces the dependency set of `id`.
    ///
    /// Handles entering the set are retained, handles leaving it are
    /// released, and handles in both keep their count.
    pub fn set_dependencies(&self, id: HandleId, deps: &[HandleId]) -> BundleResult<()> {
        let mut registry = self.registry.lock();
        for dep in deps {
            registry.entry(*dep)?;
        }

        let mut next: Vec<HandleId> = Vec::with_capacity(deps.len());
        for dep in deps {
            if *dep != id && !next.contains(dep) {
                next.push(*dep);
            }
        }

        let entry = registry.entry_mut(id)?;
        if entry.state == HandleState::Released {
            return Ok(());
        }
        let previous = std::mem::replace(&mut entry.dependencies, next.clone());
        entry.has_dependencies = true;

        for dep in next.iter().filter(|d| !previous.contains(d)) {
            if let Ok(dep_entry) = registry.entry_mut(*dep) {
                if dep_entry.state != HandleState::Released {
                    dep_entry.ref_count += 1;
                    dep_entry.pending_unload = false;
                }
            }
        }
        let dropped: Vec<HandleId> = previous
            .into_iter()
            .filter(|d| !next.contains(d))
            .collect();
        registry.release_cascade(dropped);
        Ok(())
    }

    pub fn has_dependencies(&self, id: HandleId) -> BundleResult<bool> {
        Ok(self.registry.lock().entry(id)?.has_dependencies)
    }

    /// Reads, decrypts and decodes the bundle on the calling thread.
    pub fn load_sync(&self, id: HandleId) -> BundleResult<LoadOutcome> {
        let job = match self
            .registry
            .lock()
            .begin_load(id, &self.config.storage_root)?
        {
            Ok(job) => job,
            Err(outcome) => return Ok(outcome),
        };

        let package = match std::fs::read(&job.path) {
            Ok(bytes) => self.decode(&job, bytes),
            Err(e) => {
                tracing::warn!(bundle = %job.name, path = %job.path.display(), error = %e, "bundle read failed");
                None
            }
        };
        Ok(self.registry.lock().finish_load(id, package))
    }

    /// Loads the bundle without blocking the executor.
    ///
    /// Concurrent callers for the same handle share one read; each receives
    /// the same outcome once it completes.
    pub async fn load_async(&self, id: HandleId) -> BundleResult<LoadOutcome> {
        let start = {
            let mut registry = self.registry.lock();
            match registry.join_in_flight(id)? {
                Some(rx) => Err(rx),
                None => Ok(registry.begin_load(id, &self.config.storage_root)?),
            }
        };
        let job = match start {
            Err(rx) => return Ok(rx.await.unwrap_or(LoadOutcome::Released)),
            Ok(Err(outcome)) => return Ok(outcome),
            Ok(Ok(job)) => job,
        };

        let package = {
            let _permit = self.load_permits.acquire().await.ok();
            match tokio::fs::read(&job.path).await {
                Ok(bytes) => self.decode(&job, bytes),
                Err(e) => {
                    tracing::warn!(bundle = %job.name, path = %job.path.display(), error = %e, "bundle read failed");
                    None
                }
            }
        };
        Ok(self.registry.lock().finish_load(id, package))
    }

    fn decode(&self, job: &LoadJob, bytes: Vec<u8>) -> Option<Arc<DecodedPackage>> {
        let plain = if job.key.is_empty() {
            bytes
        } else {
            cipher::decrypt(bytes, &job.key)
        };
        match self.decoder.decode(&job.name, Bytes::from(plain)) {
            Ok(package) => {
                tracing::debug!(bundle = %job.name, assets = package.asset_names().len(), "decoded bundle");
                Some(Arc::new(package))
            }
            Err(e) => {
                tracing::warn!(bundle = %job.name, error = %e, "bundle decode failed");
                None
            }
        }
    }

    /// Unloads `id` regardless of its count.
    pub fn unload(&self, id: HandleId) -> BundleResult<()> {
        let mut registry = self.registry.lock();
        registry.entry(id)?;
        registry.unload(id);
        Ok(())
    }

    /// Unloads every live handle created with `tag`. Returns how many.
    pub fn unload_with_tag(&self, tag: &str) -> usize {
        let mut registry = self.registry.lock();
        let tagged: Vec<HandleId> = registry
            .by_name
            .values()
            .copied()
            .filter(|id| registry.entry(*id).map(|e| e.tag == tag).unwrap_or(false))
            .collect();
        for id in &tagged {
            registry.unload(*id);
        }
        if !tagged.is_empty() {
            tracing::info!(tag = %tag, count = tagged.len(), "unloaded tagged bundles");
        }
        tagged.len()
    }

    pub fn unload_all(&self) {
        let mut registry = self.registry.lock();
        let ids: Vec<HandleId> = registry.by_name.values().copied().collect();
        for id in ids {
            registry.unload(id);
        }
    }

    /// Full asset path inside a loaded bundle, memoized per handle.
    pub fn find_asset_path(&self, id: HandleId, asset: &str) -> BundleResult<Option<String>> {
        let mut registry = self.registry.lock();
        let entry = registry.entry_mut(id)?;
        let Some(package) = entry.package.clone() else {
            return Ok(None);
        };
        let path = entry
            .asset_paths
            .entry(asset.to_string())
            .or_insert_with(|| find_asset_path(package.asset_names(), asset));
        Ok(path.clone())
    }

    pub fn contains_asset(&self, id: HandleId, asset: &str) -> BundleResult<bool> {
        Ok(self.find_asset_path(id, asset)?.is_some())
    }

    /// True when the last load produced no content and the handle is live.
    pub fn is_fail(&self, id: HandleId) -> bool {
        self.registry
            .lock()
            .entry(id)
            .map(|e| e.state == HandleState::Failed)
            .unwrap_or(false)
    }

    pub fn state(&self, id: HandleId) -> BundleResult<HandleState> {
        Ok(self.registry.lock().entry(id)?.state)
    }

    pub fn package(&self, id: HandleId) -> Option<Arc<DecodedPackage>> {
        self.registry.lock().entry(id).ok()?.package.clone()
    }

    pub fn snapshot(&self, id: HandleId) -> BundleResult<HandleSnapshot> {
        let registry = self.registry.lock();
        let entry = registry.entry(id)?;
        let dependencies = entry
            .dependencies
            .iter()
            .filter_map(|dep| registry.entry(*dep).ok().map(|e| e.name.clone()))
            .collect();
        Ok(HandleSnapshot {
            name: entry.name.clone(),
            tag: entry.tag.clone(),
            state: entry.state,
            ref_count: entry.ref_count,
            auto_release: entry.auto_release,
            dont_release: entry.dont_release,
            dependencies,
        })
    }
}

impl std::fmt::Debug for BundleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleCache")
            .field("storage_root", &self.config.storage_root)
            .field("live", &self.live_count())
            .finish()
    }
}

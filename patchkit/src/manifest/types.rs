//! Manifest and file entry types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::dependency::DependencyGraph;
use super::error::{ManifestError, ManifestResult};
use super::version::ResourceVersion;

/// One file delivered by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    /// Logical name, unique within a manifest.
    pub name: String,
    /// Name on disk and on the download endpoint.
    pub file_name: String,
    /// Size in bytes, or -1 when unknown.
    pub size: i64,
    /// Lowercase hex md5, or empty when unknown.
    pub md5: String,
    /// Cipher key material for encrypted bundles, empty otherwise.
    pub bundle_hash: String,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            size: -1,
            md5: String::new(),
            bundle_hash: String::new(),
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = md5.into();
        self
    }

    pub fn with_bundle_hash(mut self, hash: impl Into<String>) -> Self {
        self.bundle_hash = hash.into();
        self
    }

    /// Declared size for progress accounting; unknown sizes count as zero.
    pub fn known_size(&self) -> u64 {
        u64::try_from(self.size).unwrap_or(0)
    }

    pub fn is_encrypted(&self) -> bool {
        !self.bundle_hash.is_empty()
    }
}

/// Versioned description of a set of files and bundle dependencies.
///
/// A manifest built without a backing buffer is *empty*: every query about
/// files or bundles answers "no".
#[derive(Debug, Clone)]
pub struct Manifest {
    name: String,
    present: bool,
    foreign: bool,
    version: String,
    tag: String,
    sub_patches: Vec<String>,
    files: Vec<FileInfo>,
    file_index: HashMap<String, usize>,
    dependency_blob: Vec<u8>,
    graph: DependencyGraph,
    real_names: HashMap<String, String>,
}

/// Field values for [`Manifest::from_parts`].
#[derive(Debug, Clone, Default)]
pub struct ManifestParts {
    pub version: String,
    pub tag: String,
    pub sub_patches: Vec<String>,
    pub files: Vec<FileInfo>,
    pub graph: DependencyGraph,
}

impl Manifest {
    /// A manifest with no backing buffer.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::assemble(name.into(), false, false, ManifestParts::default(), Vec::new())
    }

    /// Builds a manifest from decoded or produced fields.
    ///
    /// Fails if two files share a logical name.
    pub fn from_parts(name: impl Into<String>, parts: ManifestParts) -> ManifestResult<Self> {
        let blob = parts.graph.encode();
        Self::from_parts_with_blob(name.into(), parts, blob)
    }

    pub(crate) fn from_parts_with_blob(
        name: String,
        parts: ManifestParts,
        dependency_blob: Vec<u8>,
    ) -> ManifestResult<Self> {
        let mut seen = HashMap::with_capacity(parts.files.len());
        for (i, file) in parts.files.iter().enumerate() {
            if seen.insert(file.name.as_str(), i).is_some() {
                return Err(ManifestError::DuplicateFile(file.name.clone()));
            }
        }
        Ok(Self::assemble(name, true, false, parts, dependency_blob))
    }

    /// A manifest that is only a dependency graph, as written by the bundle
    /// build step before any patch metadata is attached.
    pub(crate) fn foreign(name: String, blob: Vec<u8>, graph: DependencyGraph) -> Self {
        let parts = ManifestParts {
            graph,
            ..ManifestParts::default()
        };
        Self::assemble(name, true, true, parts, blob)
    }

    fn assemble(
        name: String,
        present: bool,
        foreign: bool,
        parts: ManifestParts,
        dependency_blob: Vec<u8>,
    ) -> Self {
        let file_index = parts
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let real_names = collect_real_names(&name, &parts.graph);
        Self {
            name,
            present,
            foreign,
            version: parts.version,
            tag: parts.tag,
            sub_patches: parts.sub_patches,
            files: parts.files,
            file_index,
            dependency_blob,
            graph: parts.graph,
            real_names,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        !self.present
    }

    /// True for a bare dependency graph without patch metadata.
    pub fn is_foreign(&self) -> bool {
        self.foreign
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn version_number(&self) -> Option<ResourceVersion> {
        self.version.parse().ok()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn sub_patches(&self) -> &[String] {
        &self.sub_patches
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    pub fn dependency_blob(&self) -> &[u8] {
        &self.dependency_blob
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Sum of the known sizes of all files.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(FileInfo::known_size).sum()
    }

    /// Maps a logical bundle name to the name registered in this manifest.
    /// Names without a mapping are returned unchanged.
    pub fn real_name<'a>(&'a self, bundle: &'a str) -> &'a str {
        self.real_names
            .get(bundle)
            .map(String::as_str)
            .unwrap_or(bundle)
    }

    /// Looks up a file by logical name.
    ///
    /// Bundles of a bare graph manifest have no recorded file entry; a
    /// placeholder with unknown size and md5 is synthesized for them.
    pub fn file_info(&self, name: &str) -> Option<FileInfo> {
        if !self.present {
            return None;
        }
        if let Some(&i) = self.file_index.get(name) {
            return Some(self.files[i].clone());
        }
        if self.foreign {
            return self.graph.node(name).map(|node| {
                FileInfo::new(&node.name, &node.name).with_bundle_hash(&node.hash)
            });
        }
        None
    }

    pub fn exists_file(&self, name: &str) -> bool {
        self.present
            && (self.file_index.contains_key(name) || (self.foreign && self.graph.contains(name)))
    }

    pub fn exists_bundle(&self, bundle: &str) -> bool {
        self.present && self.graph.contains(self.real_name(bundle))
    }

    /// Transitive dependencies of `bundle` as real names, leaves first.
    pub fn dependencies(&self, bundle: &str) -> Vec<String> {
        if !self.present {
            return Vec::new();
        }
        self.graph.all_dependencies(self.real_name(bundle))
    }

    pub fn bundle_hash(&self, bundle: &str) -> Option<&str> {
        self.graph.hash(self.real_name(bundle))
    }

    pub fn all_bundles(&self) -> impl Iterator<Item = &str> {
        self.graph.bundle_names()
    }
}

/// Every bundle maps to itself; `x.{manifest}` also answers to `x`.
fn collect_real_names(manifest_name: &str, graph: &DependencyGraph) -> HashMap<String, String> {
    let suffix = format!(".{}", manifest_name);
    let mut map = HashMap::with_capacity(graph.len());
    for name in graph.bundle_names() {
        if let Some(stripped) = name.strip_suffix(&suffix) {
            if !stripped.is_empty() {
                map.insert(stripped.to_string(), name.to_string());
            }
        }
    }
    for name in graph.bundle_names() {
        map.insert(name.to_string(), name.to_string());
    }
    map
}

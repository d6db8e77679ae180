//! Producing manifests from a directory of built files.

use std::path::{Path, PathBuf};

use super::dependency::DependencyGraph;
use super::error::{ManifestError, ManifestResult};
use super::types::{FileInfo, Manifest, ManifestParts};
use crate::integrity::file_md5;

/// Incrementally assembles a [`Manifest`].
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    name: String,
    parts: ManifestParts,
}

impl ManifestBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: ManifestParts::default(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.parts.version = version.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.parts.tag = tag.into();
        self
    }

    pub fn sub_patch(mut self, name: impl Into<String>) -> Self {
        self.parts.sub_patches.push(name.into());
        self
    }

    pub fn graph(mut self, graph: DependencyGraph) -> Self {
        self.parts.graph = graph;
        self
    }

    pub fn file(mut self, info: FileInfo) -> Self {
        self.parts.files.push(info);
        self
    }

    /// Adds every regular file under `dir`, recursively.
    ///
    /// Logical names are `/`-separated paths relative to `dir`. Size and md5
    /// are computed from the content; the bundle hash is taken from the graph
    /// when it declares a bundle of the same name.
    pub fn add_directory(mut self, dir: &Path) -> ManifestResult<Self> {
        let mut paths = Vec::new();
        collect_files(dir, &mut paths)?;
        paths.sort();

        for path in paths {
            let relative = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let size = std::fs::metadata(&path)
                .map_err(|e| ManifestError::io(&path, e))?
                .len();
            let md5 = file_md5(&path).map_err(|e| ManifestError::io(&path, e))?;
            let hash = self.parts.graph.hash(&relative).unwrap_or("").to_string();

            self.parts.files.push(
                FileInfo::new(relative.clone(), relative)
                    .with_size(i64::try_from(size).unwrap_or(i64::MAX))
                    .with_md5(md5)
                    .with_bundle_hash(hash),
            );
        }
        Ok(self)
    }

    pub fn build(self) -> ManifestResult<Manifest> {
        Manifest::from_parts(self.name, self.parts)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> ManifestResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| ManifestError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ManifestError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| ManifestError::io(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_directory_computes_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("ui")).unwrap();
        std::fs::write(dir.path().join("ui").join("hud"), b"hello").unwrap();
        std::fs::write(dir.path().join("common"), b"abc").unwrap();

        let mut graph = DependencyGraph::new();
        graph.add_bundle("common", "secret", vec![]);

        let manifest = ManifestBuilder::new("StreamingAssets")
            .version("1.0+0")
            .graph(graph)
            .add_directory(dir.path())
            .unwrap()
            .build()
            .unwrap();

        let names: Vec<_> = manifest.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["common", "ui/hud"]);

        let hud = manifest.file_info("ui/hud").unwrap();
        assert_eq!(hud.size, 5);
        assert_eq!(hud.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(manifest.file_info("common").unwrap().bundle_hash, "secret");
    }

    #[test]
    fn test_builder_sets_metadata() {
        let manifest = ManifestBuilder::new("m")
            .version("2.1+9")
            .tag("beta")
            .sub_patch("dlc")
            .file(FileInfo::new("dlc", "dlc_v2"))
            .build()
            .unwrap();
        assert_eq!(manifest.tag(), "beta");
        assert_eq!(manifest.sub_patches(), &["dlc".to_string()]);
        assert!(manifest.exists_file("dlc"));
    }
}

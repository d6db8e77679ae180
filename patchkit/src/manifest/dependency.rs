//! Bundle dependency graph carried in a manifest's dependency blob.
//!
//! # Blob format
//!
//! ```text
//! magic        5 bytes   "unity" (matched case-insensitively)
//! count        i32       number of bundles
//! per bundle:
//!   name       string
//!   hash       string    content hash, doubles as the bundle's cipher key
//!   dep_count  i32
//!   deps       string * dep_count
//! ```
//!
//! The same bytes are what the bundle build step writes on its own. A manifest
//! buffer that starts with the magic is therefore nothing but a graph.

use std::collections::{HashMap, HashSet};

use super::error::{ManifestError, ManifestResult};
use super::wire::{WireReader, WireWriter};

/// Magic prefix of a dependency graph blob.
pub const GRAPH_MAGIC: &[u8; 5] = b"unity";

/// Returns true if `buf` starts with the graph magic.
pub fn is_graph_blob(buf: &[u8]) -> bool {
    buf.len() >= GRAPH_MAGIC.len() && buf[..GRAPH_MAGIC.len()].eq_ignore_ascii_case(GRAPH_MAGIC)
}

/// One bundle and its direct dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleNode {
    pub name: String,
    pub hash: String,
    pub dependencies: Vec<String>,
}

/// Typed view of the bundle-to-bundle dependency edges of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<BundleNode>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a bundle node.
    pub fn add_bundle(
        &mut self,
        name: impl Into<String>,
        hash: impl Into<String>,
        dependencies: Vec<String>,
    ) {
        let node = BundleNode {
            name: name.into(),
            hash: hash.into(),
            dependencies,
        };
        match self.index.get(&node.name) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(node.name.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&BundleNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Bundle names in declaration order.
    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Direct dependencies of `name`, empty if unknown.
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.node(name)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn hash(&self, name: &str) -> Option<&str> {
        self.node(name).map(|n| n.hash.as_str())
    }

    /// Transitive dependencies of `name`, each listed once, leaves first.
    ///
    /// Every bundle appears after all of its own dependencies. Cycles are
    /// broken at the first revisit, and `name` itself is never included.
    pub fn all_dependencies(&self, name: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();
        visited.insert(name.to_string());
        for dep in self.dependencies(name) {
            self.visit(dep, &mut visited, &mut ordered);
        }
        ordered
    }

    fn visit(&self, name: &str, visited: &mut HashSet<String>, ordered: &mut Vec<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        for dep in self.dependencies(name) {
            self.visit(dep, visited, ordered);
        }
        ordered.push(name.to_string());
    }

    /// Decodes a graph blob. An empty blob is an empty graph.
    pub fn decode(blob: &[u8]) -> ManifestResult<Self> {
        if blob.is_empty() {
            return Ok(Self::new());
        }
        if !is_graph_blob(blob) {
            return Err(ManifestError::BadGraphMagic);
        }

        let mut reader = WireReader::new(&blob[GRAPH_MAGIC.len()..]);
        let count = reader.read_len()?;
        let mut graph = Self::new();
        for _ in 0..count {
            let name = reader.read_string()?;
            let hash = reader.read_string()?;
            let dep_count = reader.read_len()?;
            let mut deps = Vec::with_capacity(dep_count.min(1024));
            for _ in 0..dep_count {
                deps.push(reader.read_string()?);
            }
            graph.add_bundle(name, hash, deps);
        }
        Ok(graph)
    }

    /// Encodes the graph. An empty graph encodes to an empty blob.
    pub fn encode(&self) -> Vec<u8> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        let mut writer = WireWriter::new();
        writer.write_raw(GRAPH_MAGIC);
        writer.write_len(self.nodes.len());
        for node in &self.nodes {
            writer.write_string(&node.name);
            writer.write_string(&node.hash);
            writer.write_len(node.dependencies.len());
            for dep in &node.dependencies {
                writer.write_string(dep);
            }
        }
        writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_bundle("ui", "h-ui", vec!["atlas".into(), "fonts".into()]);
        graph.add_bundle("atlas", "h-atlas", vec!["shaders".into()]);
        graph.add_bundle("fonts", "", vec!["shaders".into()]);
        graph.add_bundle("shaders", "h-shaders", vec![]);
        graph
    }

    #[test]
    fn test_magic_is_case_insensitive() {
        assert!(is_graph_blob(b"UnityFS rest"));
        assert!(is_graph_blob(b"unity"));
        assert!(!is_graph_blob(b"unit"));
        assert!(!is_graph_blob(&[0, 0, 0, 3, 1]));
    }

    #[test]
    fn test_all_dependencies_are_leaves_first_and_unique() {
        let graph = sample_graph();
        let deps = graph.all_dependencies("ui");
        assert_eq!(deps, vec!["shaders", "atlas", "fonts"]);
    }

    #[test]
    fn test_cycle_does_not_recurse_forever() {
        let mut graph = DependencyGraph::new();
        graph.add_bundle("a", "", vec!["b".into()]);
        graph.add_bundle("b", "", vec!["a".into()]);
        assert_eq!(graph.all_dependencies("a"), vec!["b"]);
    }

    #[test]
    fn test_unknown_bundle_has_no_dependencies() {
        let graph = sample_graph();
        assert!(graph.dependencies("missing").is_empty());
        assert!(graph.all_dependencies("missing").is_empty());
    }

    #[test]
    fn test_encoded_graph_decodes_identically() {
        let graph = sample_graph();
        let blob = graph.encode();
        assert!(is_graph_blob(&blob));
        assert_eq!(DependencyGraph::decode(&blob).unwrap(), graph);
    }

    #[test]
    fn test_empty_blob_is_empty_graph() {
        assert!(DependencyGraph::decode(&[]).unwrap().is_empty());
        assert!(DependencyGraph::new().encode().is_empty());
    }

    #[test]
    fn test_wrong_magic_rejected() {
        assert!(matches!(
            DependencyGraph::decode(b"zzzzz\0\0\0\0"),
            Err(ManifestError::BadGraphMagic)
        ));
    }

    #[test]
    fn test_add_bundle_replaces_existing() {
        let mut graph = sample_graph();
        graph.add_bundle("atlas", "new", vec![]);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.hash("atlas"), Some("new"));
        assert!(graph.dependencies("atlas").is_empty());
    }
}

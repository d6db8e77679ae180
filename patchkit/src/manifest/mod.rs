//! Versioned file manifests.
//!
//! A manifest lists the files a patch channel delivers (name, on-disk name,
//! size, md5, cipher key) together with the bundle dependency graph and a
//! `<semVer>+<buildCode>` resource version. Manifests travel in a compact
//! big-endian binary format, see [`codec`].
//!
//! # Example
//!
//! ```
//! use patchkit::manifest::{self, check_resource_version, CheckResult, FileInfo, ManifestBuilder};
//!
//! let manifest = ManifestBuilder::new("StreamingAssets")
//!     .version("1.0+2")
//!     .file(FileInfo::new("ui", "ui_4f1a").with_size(10))
//!     .build()
//!     .unwrap();
//!
//! let bytes = manifest::encode(&manifest).unwrap();
//! let decoded = manifest::decode("StreamingAssets", &bytes).unwrap();
//! assert_eq!(
//!     check_resource_version("1.0+1", decoded.version()),
//!     CheckResult::DownloadPatches
//! );
//! ```

mod builder;
pub mod codec;
mod dependency;
mod error;
mod listing;
mod store;
mod types;
mod version;
mod wire;

pub use builder::ManifestBuilder;
pub use codec::{decode, encode, FORMAT_VERSION};
pub use dependency::{is_graph_blob, BundleNode, DependencyGraph, GRAPH_MAGIC};
pub use error::{ManifestError, ManifestResult};
pub use listing::{render_listing, write_file_listing, LISTING_SUFFIX};
pub use store::{load_manifest, save_manifest};
pub use types::{FileInfo, Manifest, ManifestParts};
pub use version::{
    check_resource_version, format_version, CheckResult, ParseVersionError, ResourceVersion,
    OLDEST_VERSION,
};

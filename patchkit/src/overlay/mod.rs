//! Layered search path across manifests.
//!
//! # Overview
//!
//! The application ships a base manifest; downloaded patches and sub-patches
//! add manifests on top of it. [`ManifestOverlay`] answers "which layer serves
//! this bundle" by asking each layer in order. The first layer that declares
//! the bundle wins.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ layer 0   hotfix  (1.2+9)    │  ◀── searched first
//! ├──────────────────────────────┤
//! │ layer 1   dlc     (1.2+4)    │
//! ├──────────────────────────────┤
//! │ layer 2   base    (1.2+0)    │  ◀── installed with the app
//! └──────────────────────────────┘
//!               │
//!               ▼
//!        BundleCache (handles tagged by layer name)
//! ```
//!
//! Bundle, asset and dependency lookups are memoized. Every change to the
//! layer list clears the memos; removing a layer also unloads the bundles it
//! served.
//!
//! Resources can also be addressed by path, see [`resource_bundle_name`].

mod resources;
mod search_path;

pub use resources::{resource_bundle_name, ROOT_RESOURCE_BUNDLE};
pub use search_path::ManifestOverlay;

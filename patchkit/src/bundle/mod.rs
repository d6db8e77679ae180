//! Bundle loading with reference-counted lifetime.
//!
//! [`BundleCache`] owns one slot per live bundle. Callers address slots
//! through generation-checked [`HandleId`]s, retain and release them, and
//! let dependency sets keep the bundles they need alive.
//!
//! Decoding bundle bytes into engine content is not done here; it goes
//! through the [`PackageDecoder`] seam. Encrypted bundles are decrypted with
//! the key from their `FileInfo::bundle_hash` before decoding.

mod asset;
mod cache;
pub mod cipher;
mod decoder;
mod error;
mod handle;

pub use asset::find_asset_path;
pub use cache::{BundleCache, CacheConfig, DEFAULT_MAX_CONCURRENT_LOADS};
pub use decoder::{DecodeError, DecodedPackage, PackageDecoder, RawDecoder};
pub use error::{BundleError, BundleResult};
pub use handle::{HandleId, HandleSnapshot, HandleState, LoadOutcome};

#[cfg(test)]
pub(crate) use decoder::tests::AssetListDecoder;

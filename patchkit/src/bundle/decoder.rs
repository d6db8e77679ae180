//! The seam to the engine that turns bundle bytes into loaded content.

use bytes::Bytes;
use thiserror::Error;

/// Error returned by a [`PackageDecoder`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("decode failed: {0}")]
pub struct DecodeError(pub String);

/// Content produced by decoding a bundle.
#[derive(Debug, Clone)]
pub struct DecodedPackage {
    asset_names: Vec<String>,
    payload: Bytes,
}

impl DecodedPackage {
    pub fn new(asset_names: Vec<String>, payload: Bytes) -> Self {
        Self {
            asset_names,
            payload,
        }
    }

    /// Full asset paths contained in the bundle, e.g. `assets/ui/hud.prefab`.
    pub fn asset_names(&self) -> &[String] {
        &self.asset_names
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Decodes plaintext bundle bytes.
///
/// Implementations must be cheap to share across tasks; decoding happens
/// outside the cache lock.
pub trait PackageDecoder: Send + Sync {
    fn decode(&self, name: &str, bytes: Bytes) -> Result<DecodedPackage, DecodeError>;
}

/// Accepts any non-empty buffer as a bundle with no addressable assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl PackageDecoder for RawDecoder {
    fn decode(&self, name: &str, bytes: Bytes) -> Result<DecodedPackage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError(format!("bundle '{}' is empty", name)));
        }
        Ok(DecodedPackage::new(Vec::new(), bytes))
    }
}

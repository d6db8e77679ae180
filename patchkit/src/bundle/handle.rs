//! Handle identifiers and observable handle state.

use std::fmt;
use std::sync::Arc;

use super::decoder::DecodedPackage;
use super::error::{BundleError, BundleResult};

/// Generation-checked reference to a slot in the bundle cache.
///
/// A slot is reused once its bundle is unloaded; ids from the previous
/// occupant then fail with [`BundleError::StaleHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Load lifecycle of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
    Released,
}

/// Result of a load request.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(Arc<DecodedPackage>),
    /// Reading or decoding produced no content.
    Failed,
    /// The handle was unloaded before or during the load.
    Released,
}

impl LoadOutcome {
    /// The decoded package, or `None` for failed and released loads.
    pub fn package(&self) -> Option<&Arc<DecodedPackage>> {
        match self {
            Self::Loaded(package) => Some(package),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Interprets a failed or released load as an error.
    pub fn into_result(self, bundle: &str) -> BundleResult<Arc<DecodedPackage>> {
        match self {
            Self::Loaded(package) => Ok(package),
            Self::Failed => Err(BundleError::LoadFailed(bundle.to_string())),
            Self::Released => Err(BundleError::Released(bundle.to_string())),
        }
    }
}

/// Point-in-time copy of a handle's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSnapshot {
    pub name: String,
    pub tag: String,
    pub state: HandleState,
    pub ref_count: u32,
    pub auto_release: bool,
    pub dont_release: bool,
    pub dependencies: Vec<String>,
}

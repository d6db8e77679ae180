//! Error types for manifest encoding and decoding.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors that can occur while reading, writing or building manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The buffer ended before a field could be read.
    #[error("manifest truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    /// A length prefix was negative.
    #[error("negative length {len} at offset {offset}")]
    NegativeLength { offset: usize, len: i32 },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// The embedded file info table could not be (de)serialized.
    #[error("file info table: {0}")]
    Table(#[from] bincode::Error),

    /// The dependency blob did not start with the graph magic.
    #[error("dependency blob has an unrecognized header")]
    BadGraphMagic,

    /// Two file entries share the same logical name.
    #[error("duplicate file entry '{0}'")]
    DuplicateFile(String),

    /// Filesystem access failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A listing could not be serialized.
    #[error("failed to serialize listing: {0}")]
    Listing(#[from] serde_json::Error),
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

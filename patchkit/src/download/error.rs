//! Error types for patch downloads.

use std::io;
use std::path::PathBuf;

use crate::manifest::ManifestError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while fetching patch files.
#[derive(Debug)]
pub enum DownloadError {
    /// The request could not be sent or the body could not be read.
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    Status { url: String, status: u16 },

    /// Network timeout.
    Timeout { url: String, timeout_secs: u64 },

    /// Failed to write a downloaded file.
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create the save directory.
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to delete a corrupt or partial file.
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Failed to read a local file while verifying it.
    ReadFailed { path: PathBuf, source: io::Error },

    /// A downloaded file does not match its manifest entry.
    Integrity { file_name: String, reason: String },

    /// The remote manifest could not be decoded or saved.
    Manifest(ManifestError),

    /// The session was stopped while this request was in flight.
    Cancelled { url: String },

    /// `run` or `retry` was called before `prepare`.
    NotPrepared,

    /// The HTTP client could not be constructed.
    ClientBuild(String),
}

impl DownloadError {
    /// Whether the failure came from the network rather than local disk.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Request { .. } | Self::Status { .. } | Self::Timeout { .. }
        )
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request { url, reason } => {
                write!(f, "failed to download {}: {}", url, reason)
            }
            Self::Status { url, status } => {
                write!(f, "HTTP {} from {}", status, url)
            }
            Self::Timeout { url, timeout_secs } => {
                write!(f, "request to {} timed out after {}s", url, timeout_secs)
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::CreateDirFailed { path, source } => {
                write!(
                    f,
                    "failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
            Self::RemoveFailed { path, source } => {
                write!(f, "failed to remove {}: {}", path.display(), source)
            }
            Self::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            Self::Integrity { file_name, reason } => {
                write!(f, "{} failed verification: {}", file_name, reason)
            }
            Self::Manifest(e) => write!(f, "manifest error: {}", e),
            Self::Cancelled { url } => write!(f, "download of {} was cancelled", url),
            Self::NotPrepared => write!(f, "download session has not been prepared"),
            Self::ClientBuild(msg) => write!(f, "failed to create HTTP client: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WriteFailed { source, .. } => Some(source),
            Self::CreateDirFailed { source, .. } => Some(source),
            Self::RemoveFailed { source, .. } => Some(source),
            Self::ReadFailed { source, .. } => Some(source),
            Self::Manifest(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ManifestError> for DownloadError {
    fn from(e: ManifestError) -> Self {
        Self::Manifest(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let e = DownloadError::Status {
            url: "http://cdn/ui".to_string(),
            status: 404,
        };
        assert_eq!(e.to_string(), "HTTP 404 from http://cdn/ui");

        let e = DownloadError::Timeout {
            url: "http://cdn/ui".to_string(),
            timeout_secs: 30,
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn test_io_variants_expose_source() {
        let e = DownloadError::WriteFailed {
            path: PathBuf::from("/tmp/ui"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(e.source().is_some());
        assert!(DownloadError::NotPrepared.source().is_none());
    }

    #[test]
    fn test_is_network() {
        assert!(DownloadError::Request {
            url: "u".into(),
            reason: "reset".into()
        }
        .is_network());
        assert!(!DownloadError::Integrity {
            file_name: "ui".into(),
            reason: "md5".into()
        }
        .is_network());
    }
}

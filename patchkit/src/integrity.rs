//! MD5 digests and file integrity checks against [`FileInfo`] entries.
//!
//! A file satisfies its entry when the size matches (unless the entry's size
//! is unknown) and the md5 matches (unless the entry's md5 is empty).

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};

use crate::manifest::FileInfo;

/// Buffer size for reading files during digest calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hex md5 of a byte slice.
pub fn bytes_md5(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// Lowercase hex md5 of a file's contents.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Outcome of comparing a local file with its manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityCheck {
    Valid,
    Missing,
    SizeMismatch { expected: i64, actual: u64 },
    Md5Mismatch { expected: String, actual: String },
}

impl IntegrityCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// True when the file exists but does not match.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::Md5Mismatch { .. })
    }
}

impl std::fmt::Display for IntegrityCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Missing => write!(f, "missing"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {}, got {}", expected, actual)
            }
            Self::Md5Mismatch { expected, actual } => {
                write!(f, "md5 mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

/// Compares the file at `path` with `info`.
///
/// The size is checked first so that a truncated file is rejected without
/// hashing it.
pub fn check_file_info(path: &Path, info: &FileInfo) -> io::Result<IntegrityCheck> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(IntegrityCheck::Missing),
        Err(e) => return Err(e),
    };
    if !metadata.is_file() {
        return Ok(IntegrityCheck::Missing);
    }

    if info.size >= 0 && metadata.len() != info.size as u64 {
        return Ok(IntegrityCheck::SizeMismatch {
            expected: info.size,
            actual: metadata.len(),
        });
    }

    if !info.md5.is_empty() {
        let actual = file_md5(path)?;
        if !actual.eq_ignore_ascii_case(&info.md5) {
            return Ok(IntegrityCheck::Md5Mismatch {
                expected: info.md5.clone(),
                actual,
            });
        }
    }

    Ok(IntegrityCheck::Valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(bytes_md5(b"hello"), HELLO_MD5);
        assert_eq!(bytes_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_file_md5_matches_bytes_md5() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "hello.bin", b"hello");
        assert_eq!(file_md5(&path).unwrap(), HELLO_MD5);
    }

    #[test]
    fn test_file_md5_spans_multiple_buffers() {
        let dir = TempDir::new().unwrap();
        let content = vec![7u8; BUFFER_SIZE * 2 + 17];
        let path = write_file(&dir, "big.bin", &content);
        assert_eq!(file_md5(&path).unwrap(), bytes_md5(&content));
    }

    #[test]
    fn test_check_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a", b"hello");
        let info = FileInfo::new("a", "a").with_size(5).with_md5(HELLO_MD5);
        assert!(check_file_info(&path, &info).unwrap().is_valid());
    }

    #[test]
    fn test_check_missing_file() {
        let dir = TempDir::new().unwrap();
        let info = FileInfo::new("a", "a").with_size(5);
        assert_eq!(
            check_file_info(&dir.path().join("a"), &info).unwrap(),
            IntegrityCheck::Missing
        );
    }

    #[test]
    fn test_check_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a", b"hell");
        let info = FileInfo::new("a", "a").with_size(5).with_md5(HELLO_MD5);
        let check = check_file_info(&path, &info).unwrap();
        assert!(check.is_corrupt());
        assert_eq!(
            check,
            IntegrityCheck::SizeMismatch {
                expected: 5,
                actual: 4
            }
        );
    }

    #[test]
    fn test_check_md5_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a", b"jello");
        let info = FileInfo::new("a", "a").with_size(5).with_md5(HELLO_MD5);
        assert!(matches!(
            check_file_info(&path, &info).unwrap(),
            IntegrityCheck::Md5Mismatch { .. }
        ));
    }

    #[test]
    fn test_unknown_size_and_md5_accept_any_content() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a", b"whatever");
        let info = FileInfo::new("a", "a");
        assert!(check_file_info(&path, &info).unwrap().is_valid());
    }
}

//! Download tasks.

use std::path::{Path, PathBuf};

use crate::manifest::FileInfo;

/// Lifecycle of a single file download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One file to fetch.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub save_path: PathBuf,
    /// Manifest entry the result is verified against, if any.
    pub expected: Option<FileInfo>,
    pub error_count: u32,
    pub state: TaskState,
}

impl DownloadTask {
    /// A task with no expected size or md5.
    pub fn new(url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            save_path: save_path.into(),
            expected: None,
            error_count: 0,
            state: TaskState::Pending,
        }
    }

    /// A task fetching `{url_prefix}{file_name}` into `{dir}/{file_name}`.
    pub fn for_file(url_prefix: &str, dir: &Path, info: &FileInfo) -> Self {
        Self {
            expected: Some(info.clone()),
            ..Self::new(
                format!("{}{}", url_prefix, info.file_name),
                dir.join(&info.file_name),
            )
        }
    }

    /// Display name: the manifest file name, else the save path.
    pub fn file_name(&self) -> String {
        match &self.expected {
            Some(info) => info.file_name.clone(),
            None => self.save_path.display().to_string(),
        }
    }

    /// Size declared by the manifest, zero when unknown.
    pub fn expected_size(&self) -> u64 {
        self.expected.as_ref().map(FileInfo::known_size).unwrap_or(0)
    }
}

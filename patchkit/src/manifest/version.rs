//! Resource version strings and the update decision derived from them.
//!
//! A resource version is `<semVer>+<buildCode>`, e.g. `1.4.2+318`. The
//! semantic part identifies the application build the content targets; the
//! build code counts content-only patches on top of it.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version assigned to a manifest whose checksum does not validate.
pub const OLDEST_VERSION: &str = "0.0+0";

/// What a client at one version must do to reach another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckResult {
    /// Already up to date.
    Nothing,
    /// Same application build; content patches must be downloaded.
    DownloadPatches,
    /// The application itself is too old to patch in place.
    DownloadApp,
    /// A remote manifest must be consulted before deciding.
    NeedCheck,
    /// The check could not complete and should be tried again.
    Retry,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nothing => "nothing",
            Self::DownloadPatches => "download-patches",
            Self::DownloadApp => "download-app",
            Self::NeedCheck => "need-check",
            Self::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// A parsed `<semVer>+<buildCode>` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceVersion {
    components: Vec<u64>,
    build: u64,
}

/// Error returned when a version string does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource version '{0}'")]
pub struct ParseVersionError(pub String);

impl ResourceVersion {
    pub fn new(components: Vec<u64>, build: u64) -> Self {
        Self { components, build }
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    pub fn build(&self) -> u64 {
        self.build
    }

    /// Compares the semantic part only, padding missing components with zero.
    pub fn cmp_sem(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl FromStr for ResourceVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let (sem, build) = s.trim().split_once('+').ok_or_else(err)?;
        if sem.is_empty() {
            return Err(err());
        }
        let components = sem
            .split('.')
            .map(|c| c.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| err())?;
        let build = build.parse::<u64>().map_err(|_| err())?;
        Ok(Self { components, build })
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sem: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}+{}", sem.join("."), self.build)
    }
}

/// Formats a version string from its two halves.
pub fn format_version(sem_ver: &str, build: u64) -> String {
    format!("{}+{}", sem_ver, build)
}

/// Decides what a client at `current` must do to reach `target`.
///
/// An empty or unparseable target never triggers work. An empty or
/// unparseable current version always needs patches.
///
/// Build codes are only compared when the semantic parts are textually
/// identical. Otherwise the semantic parts are ordered numerically, so
/// `1.0` and `1.0.0` are different builds but neither is older.
pub fn check_resource_version(current: &str, target: &str) -> CheckResult {
    if target.is_empty() {
        return CheckResult::Nothing;
    }
    if current.is_empty() {
        return CheckResult::DownloadPatches;
    }

    let Ok(target_version) = target.parse::<ResourceVersion>() else {
        tracing::warn!(target = %target, "unparseable target version");
        return CheckResult::Nothing;
    };
    let Ok(current_version) = current.parse::<ResourceVersion>() else {
        tracing::warn!(current = %current, "unparseable current version");
        return CheckResult::DownloadPatches;
    };

    if sem_part(current) == sem_part(target) {
        return if current_version.build < target_version.build {
            CheckResult::DownloadPatches
        } else {
            CheckResult::Nothing
        };
    }
    match current_version.cmp_sem(&target_version) {
        Ordering::Less => CheckResult::DownloadApp,
        Ordering::Equal | Ordering::Greater => CheckResult::Nothing,
    }
}

fn sem_part(version: &str) -> &str {
    version
        .trim()
        .split_once('+')
        .map_or(version, |(sem, _)| sem)
}

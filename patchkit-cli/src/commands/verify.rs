//! Check the local patch directory against its saved manifests.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use patchkit::config::ConfigFile;
use patchkit::download::{DownloadTask, PatchDownloader};
use patchkit::manifest::load_manifest;

use super::common::{format_size, runtime, with_save_path};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Patch directory to check instead of the configured one
    #[arg(long)]
    pub save_path: Option<PathBuf>,

    /// Do not follow the manifest's sub-patches
    #[arg(long)]
    pub no_sub_patches: bool,
}

/// Files one manifest still needs.
#[derive(Debug)]
struct ManifestReport {
    name: String,
    version: String,
    missing: Vec<DownloadTask>,
}

/// Run the verify command.
///
/// Corrupt files are deleted while checking, so the next update fetches
/// them again.
pub fn run(args: VerifyArgs, config: ConfigFile) -> Result<(), CliError> {
    let config = with_save_path(config, args.save_path);
    println!("Verifying {}", config.patch.save_path.display());

    let reports = runtime()?.block_on(verify(&config, !args.no_sub_patches))?;

    let mut missing = 0;
    for report in &reports {
        let version = if report.version.is_empty() {
            "not installed"
        } else {
            report.version.as_str()
        };
        if report.missing.is_empty() {
            println!("  {} ({}): ok", report.name, version);
            continue;
        }
        let bytes: u64 = report.missing.iter().map(DownloadTask::expected_size).sum();
        println!(
            "  {} ({}): {} file(s) missing, {}",
            report.name,
            version,
            report.missing.len(),
            format_size(bytes)
        );
        for task in &report.missing {
            println!("    {}", task.file_name());
        }
        missing += report.missing.len();
    }

    if missing > 0 {
        return Err(CliError::Incomplete { missing });
    }
    Ok(())
}

async fn verify(config: &ConfigFile, follow_sub_patches: bool) -> Result<Vec<ManifestReport>, CliError> {
    let save_path = &config.patch.save_path;
    let primary = load_manifest(&save_path.join(&config.patch.manifest_name))?;

    let mut names = vec![config.patch.manifest_name.clone()];
    if follow_sub_patches {
        names.extend(primary.sub_patches().iter().cloned());
    }

    let mut reports = Vec::with_capacity(names.len());
    for name in names {
        let manifest = if name == config.patch.manifest_name {
            primary.clone()
        } else {
            load_manifest(&save_path.join(&name))?
        };
        let version = manifest.version().to_string();

        let mut downloader = PatchDownloader::with_http(
            config.downloader_config().with_manifest_name(name.clone()),
            save_path,
            config.download.url_prefix.clone(),
        )?;
        downloader.prepare(Arc::new(manifest)).await?;

        reports.push(ManifestReport {
            name,
            version,
            missing: downloader.queued_tasks().cloned().collect(),
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchkit::manifest::{save_manifest, FileInfo, ManifestBuilder};
    use tempfile::TempDir;

    fn config(save_path: &std::path::Path) -> ConfigFile {
        let mut config = ConfigFile::default();
        config.patch.save_path = save_path.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_reports_missing_files_per_manifest() {
        let temp = TempDir::new().unwrap();
        let main = ManifestBuilder::new("StreamingAssets")
            .version("1.0+2")
            .sub_patch("patch_ui")
            .file(FileInfo::new("common", "common").with_size(6))
            .build()
            .unwrap();
        save_manifest(&temp.path().join("StreamingAssets"), &main).unwrap();
        std::fs::write(temp.path().join("common"), b"common").unwrap();

        let sub = ManifestBuilder::new("patch_ui")
            .version("1.0+2")
            .file(FileInfo::new("ui", "ui.bundle").with_size(4))
            .build()
            .unwrap();
        save_manifest(&temp.path().join("patch_ui"), &sub).unwrap();

        let reports = verify(&config(temp.path()), true).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].missing.is_empty());
        assert_eq!(reports[1].name, "patch_ui");
        assert_eq!(reports[1].missing.len(), 1);
        assert_eq!(reports[1].missing[0].file_name(), "ui.bundle");

        let reports = verify(&config(temp.path()), false).await.unwrap();
        assert_eq!(reports.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_directory_has_nothing_to_check() {
        let temp = TempDir::new().unwrap();
        let reports = verify(&config(temp.path()), true).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].version.is_empty());
        assert!(reports[0].missing.is_empty());
    }
}

//! Print the contents of a manifest file.

use std::path::PathBuf;

use clap::Args;
use patchkit::manifest::{load_manifest, Manifest};

use super::common::format_size;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Path to the manifest file
    pub manifest: PathBuf,

    /// Also print each bundle's dependencies
    #[arg(long)]
    pub deps: bool,
}

/// Run the inspect command.
pub fn run(args: InspectArgs) -> Result<(), CliError> {
    let manifest = load_manifest(&args.manifest)?;
    print!("{}", render(&manifest, args.deps));
    Ok(())
}

fn render(manifest: &Manifest, deps: bool) -> String {
    let mut out = String::new();
    let version = if manifest.version().is_empty() {
        "(none)"
    } else {
        manifest.version()
    };

    out.push_str(&format!("Manifest:    {}\n", manifest.name()));
    out.push_str(&format!("Version:     {}\n", version));
    if !manifest.tag().is_empty() {
        out.push_str(&format!("Tag:         {}\n", manifest.tag()));
    }
    if manifest.is_foreign() {
        out.push_str("Format:      dependency graph only\n");
        let bundles: Vec<&str> = manifest.all_bundles().collect();
        out.push_str(&format!("Bundles:     {}\n", bundles.join(", ")));
    }
    if !manifest.sub_patches().is_empty() {
        out.push_str(&format!(
            "Sub-patches: {}\n",
            manifest.sub_patches().join(", ")
        ));
    }
    out.push_str(&format!(
        "Files:       {} ({})\n",
        manifest.files().len(),
        format_size(manifest.total_size())
    ));

    for info in manifest.files() {
        let size = if info.size < 0 {
            "?".to_string()
        } else {
            format_size(info.known_size())
        };
        let flag = if info.is_encrypted() { " [encrypted]" } else { "" };
        out.push_str(&format!("  {:<40} {:>12}  {}{}\n", info.name, size, info.md5, flag));
        if info.file_name != info.name {
            out.push_str(&format!("    -> {}\n", info.file_name));
        }
        if deps {
            let bundle_deps = manifest.dependencies(&info.name);
            if !bundle_deps.is_empty() {
                out.push_str(&format!("    depends on: {}\n", bundle_deps.join(", ")));
            }
        }
    }
    out
}

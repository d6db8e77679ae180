//! Build a manifest from a directory of built files.

use std::path::{Path, PathBuf};

use clap::Args;
use patchkit::config::DEFAULT_MANIFEST_NAME;
use patchkit::manifest::{save_manifest, write_file_listing, Manifest, ManifestBuilder};

use super::common::format_size;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Directory whose files the manifest lists
    pub dir: PathBuf,

    /// Resource version, e.g. 1.2+40
    #[arg(long)]
    pub version: String,

    /// Output manifest path; must be outside the packed directory
    #[arg(long)]
    pub out: PathBuf,

    /// Manifest name
    #[arg(long, default_value = DEFAULT_MANIFEST_NAME)]
    pub name: String,

    /// Layer tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Sub-patch manifest names (repeatable)
    #[arg(long = "sub-patch")]
    pub sub_patches: Vec<String>,

    /// Also write the JSON listing next to the manifest
    #[arg(long)]
    pub listing: bool,
}

/// Run the pack command.
pub fn run(args: PackArgs) -> Result<(), CliError> {
    let manifest = pack(&args)?;
    save_manifest(&args.out, &manifest)?;

    println!("Packed {}", args.dir.display());
    println!("  Manifest: {}", args.out.display());
    println!("  Version:  {}", manifest.version());
    println!(
        "  Files:    {} ({})",
        manifest.files().len(),
        format_size(manifest.total_size())
    );

    if args.listing {
        let dir = args.out.parent().unwrap_or_else(|| Path::new("."));
        let path = write_file_listing(&manifest, dir)?;
        println!("  Listing:  {}", path.display());
    }
    Ok(())
}

fn pack(args: &PackArgs) -> Result<Manifest, CliError> {
    if !args.dir.is_dir() {
        return Err(CliError::Config(format!(
            "{} is not a directory",
            args.dir.display()
        )));
    }
    if is_inside(&args.out, &args.dir) {
        return Err(CliError::Config(
            "--out must be outside the packed directory".to_string(),
        ));
    }
    if args.version.parse::<patchkit::manifest::ResourceVersion>().is_err() {
        return Err(CliError::Config(format!(
            "invalid version '{}', expected <major.minor...>+<build>",
            args.version
        )));
    }

    let mut builder = ManifestBuilder::new(&args.name).version(&args.version);
    if let Some(tag) = &args.tag {
        builder = builder.tag(tag);
    }
    for sub in &args.sub_patches {
        builder = builder.sub_patch(sub);
    }
    Ok(builder.add_directory(&args.dir)?.build()?)
}

fn is_inside(path: &Path, dir: &Path) -> bool {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    parent.starts_with(dir)
}

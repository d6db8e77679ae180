//! Emit the JSON file listing of a manifest.

use std::path::PathBuf;

use clap::Args;
use patchkit::manifest::{load_manifest, render_listing, write_file_listing};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ListingArgs {
    /// Path to the manifest file
    pub manifest: PathBuf,

    /// Write `{name}_files.manifest` into this directory instead of stdout
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

/// Run the listing command.
pub fn run(args: ListingArgs) -> Result<(), CliError> {
    let manifest = load_manifest(&args.manifest)?;

    match args.out_dir {
        Some(dir) => {
            let path = write_file_listing(&manifest, &dir)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", render_listing(&manifest)?),
    }
    Ok(())
}

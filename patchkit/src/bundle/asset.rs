//! Matching short asset names against a bundle's full asset paths.

use regex::RegexBuilder;

/// Prefix of every full asset path.
const ASSET_ROOT: &str = "assets/";

/// Finds the full path in `asset_names` that `asset` refers to.
///
/// A name starting with `assets/` is treated as a full path and matched by
/// case-sensitive prefix. Anything else is a basename, optionally with
/// parent directories, matched case-insensitively under any directory and
/// with any extension.
pub fn find_asset_path(asset_names: &[String], asset: &str) -> Option<String> {
    if asset.starts_with(ASSET_ROOT) {
        return asset_names
            .iter()
            .find(|name| name.starts_with(asset))
            .cloned();
    }

    let pattern = format!(
        r"^assets/([\w\s]+/)*{}(\.\w+)?$",
        regex::escape(&asset.to_lowercase())
    );
    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(asset = %asset, error = %e, "invalid asset pattern");
            return None;
        }
    };
    asset_names.iter().find(|name| re.is_match(name)).cloned()
}

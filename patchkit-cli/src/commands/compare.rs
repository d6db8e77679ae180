//! Compare two resource versions.

use clap::Args;
use patchkit::manifest::{check_resource_version, CheckResult};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Version currently installed, e.g. 1.2+40
    pub current: String,

    /// Version offered by the server
    pub target: String,
}

/// Run the compare command.
pub fn run(args: CompareArgs) -> Result<(), CliError> {
    let result = check_resource_version(&args.current, &args.target);
    println!("{}", result);
    println!("  {}", describe(result));
    Ok(())
}

fn describe(result: CheckResult) -> &'static str {
    match result {
        CheckResult::Nothing => "Installed resources are current",
        CheckResult::DownloadPatches => "Newer build of the same release: download patches",
        CheckResult::DownloadApp => "Newer release: a new application build is required",
        CheckResult::NeedCheck => "Remote manifest must be consulted",
        CheckResult::Retry => "Versions could not be compared",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_matches_comparison() {
        assert_eq!(
            describe(check_resource_version("1.0+1", "1.0+2")),
            "Newer build of the same release: download patches"
        );
        assert_eq!(
            describe(check_resource_version("1.0+1", "1.1+0")),
            "Newer release: a new application build is required"
        );
    }
}

//! Run an update check and download patches.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use patchkit::config::ConfigFile;
use patchkit::download::SessionProgress;
use patchkit::update::{UpdateFlow, UpdateListener, UpdateOutcome};

use super::common::{format_size, runtime};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Answer yes to every prompt
    #[arg(long, short)]
    pub yes: bool,

    /// Compare against this version instead of the saved manifest
    #[arg(long)]
    pub running_version: Option<String>,

    /// Override the remote manifest URL
    #[arg(long)]
    pub manifest_url: Option<String>,
}

/// Terminal front end for an update check.
struct TerminalListener {
    bar: ProgressBar,
    assume_yes: bool,
}

impl TerminalListener {
    fn new(assume_yes: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.green/dim}] {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self { bar, assume_yes }
    }

    fn confirm(&self, prompt: &str, default: bool) -> bool {
        if self.assume_yes {
            return default;
        }
        self.bar.suspend(|| {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(default)
                .interact()
                .unwrap_or(false)
        })
    }
}

impl UpdateListener for TerminalListener {
    fn update_started(&self) {
        println!("Checking for updates...");
    }

    fn update_complete(&self, outcome: UpdateOutcome) {
        self.bar.finish_and_clear();
        tracing::info!(?outcome, "update check complete");
    }

    fn net_error(&self) -> bool {
        println!("{}", style("Could not reach the patch server.").yellow());
        // non-interactive runs never retry
        !self.assume_yes && self.confirm("Try again?", true)
    }

    fn confirm_patch_download(&self, bytes: u64, files: usize) -> bool {
        let accepted = self.confirm(
            &format!("Download {} in {} file(s)?", format_size(bytes), files),
            true,
        );
        if accepted {
            self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            self.bar.set_length(bytes);
            self.bar.set_message("Downloading");
            self.bar.enable_steady_tick(Duration::from_millis(200));
        }
        accepted
    }

    fn confirm_app_download(&self, version: &str) -> bool {
        println!(
            "{}",
            style(format!("Version {} requires a new application build.", version)).yellow()
        );
        self.confirm("Open the application download?", true)
    }

    fn progress(&self, progress: &SessionProgress) {
        self.bar.set_length(progress.total_task_size);
        self.bar.set_position(progress.downloaded_bytes);
        self.bar.set_message(format!(
            "{}/{} files",
            progress.downloaded_count, progress.total_task_count
        ));
    }
}

/// Run the update command.
pub fn run(args: UpdateArgs, config: ConfigFile) -> Result<(), CliError> {
    let mut settings = config.update_settings();
    if let Some(url) = args.manifest_url {
        settings.manifest_url = url;
    }
    if settings.url_prefix.is_empty() {
        return Err(CliError::Config(
            "url_prefix is not set in [download]".to_string(),
        ));
    }

    let listener = Arc::new(TerminalListener::new(args.yes));
    let mut flow = UpdateFlow::with_http(settings, listener)?;
    if let Some(version) = args.running_version {
        flow = flow.with_running_version(version);
    }

    let control = flow.control();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping download...");
        control.stop();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let outcome = runtime()?.block_on(flow.check_and_update());
    report(outcome)
}

fn report(outcome: UpdateOutcome) -> Result<(), CliError> {
    match outcome {
        UpdateOutcome::Nothing => {
            println!("{}", style("Resources are up to date.").green());
            Ok(())
        }
        UpdateOutcome::DownloadPatches => {
            println!("{}", style("Patches downloaded. Restart to apply them.").green());
            Ok(())
        }
        UpdateOutcome::DownloadApp => {
            println!("A new application build is required to continue.");
            Ok(())
        }
        UpdateOutcome::Retry => Err(CliError::UpdateIncomplete),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_yes_accepts_downloads_but_never_retries() {
        let listener = TerminalListener::new(true);
        assert!(listener.confirm_patch_download(1024, 2));
        assert!(listener.confirm_app_download("2.0+0"));
        assert!(!listener.net_error());
    }

    #[test]
    fn test_retry_outcome_is_an_error() {
        assert!(report(UpdateOutcome::Nothing).is_ok());
        assert!(matches!(
            report(UpdateOutcome::Retry),
            Err(CliError::UpdateIncomplete)
        ));
    }

    #[test]
    fn test_missing_prefix_is_rejected() {
        let args = UpdateArgs {
            yes: true,
            running_version: None,
            manifest_url: None,
        };
        let mut config = ConfigFile::default();
        config.download.url_prefix.clear();
        assert!(matches!(run(args, config), Err(CliError::Config(_))));
    }
}

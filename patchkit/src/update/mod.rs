//! Check-download-restart orchestration on top of the downloader.
//!
//! [`UpdateFlow`] compares the running version with the remote manifest and
//! decides between nothing, a patch download and a full application
//! download. The caller is kept out of internal error kinds: it only sees
//! [`UpdateListener`] notifications and an [`UpdateOutcome`].

mod flow;
mod patch_check;

pub use flow::{NoopListener, UpdateFlow, UpdateListener, UpdateOutcome, UpdateSettings};
pub use patch_check::{check_download_patch, local_patch_decision, PatchRequest};

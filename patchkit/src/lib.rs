//! Patchkit - manifest-driven patch delivery
//!
//! This library provides the pieces an application needs to ship content
//! updates as patches: a binary manifest format, a reference-counted bundle
//! cache, a layered search path over several manifests, and a download
//! scheduler that brings a local patch directory in line with a remote
//! manifest.
//!
//! # Modules
//!
//! - [`manifest`]: manifest values, wire codec, version comparison
//! - [`bundle`]: bundle handles, loading, dependency retention
//! - [`overlay`]: priority-ordered manifest layers over the bundle cache
//! - [`download`]: download sessions with retry, pause and stop
//! - [`update`]: the check/download/restart flow
//! - [`config`]: `config.ini` handling
//! - [`logging`]: tracing subscriber setup

pub mod bundle;
pub mod config;
pub mod download;
pub mod integrity;
pub mod logging;
pub mod manifest;
pub mod overlay;
pub mod update;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

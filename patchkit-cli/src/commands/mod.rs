//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`compare`] - Version comparison
//! - [`config`] - Configuration management (init, show)
//! - [`inspect`] - Manifest contents
//! - [`listing`] - JSON file listing
//! - [`pack`] - Manifest production from a build directory
//! - [`update`] - Update check and patch download
//! - [`verify`] - Local patch directory check

pub mod common;
pub mod compare;
pub mod config;
pub mod inspect;
pub mod listing;
pub mod pack;
pub mod update;
pub mod verify;

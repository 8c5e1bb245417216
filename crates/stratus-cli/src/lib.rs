//! Stratus CLI - argument parsing shared by the `stratus` binary.

pub mod config;

pub use config::{Command, Config, version_info};

//! Configuration loading, environment overrides and validation.
//!
//! Config files: `teamsync.toml`, `teamsync.yaml`, or `teamsync.json`
//! Searched in `./` then `~/.config/teamsync/`.

pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{BridgeConfig, ServerConfig, StorageConfig, TeamsyncConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};

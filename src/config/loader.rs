// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawSettings, Settings};
use crate::errors::Result;

/// Load a settings file and return the raw, unvalidated `RawSettings`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawSettings = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a settings file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let raw = load_from_path(&path)?;
    Settings::try_from(raw)
}

/// Resolve the settings to use for this invocation.
///
/// - An explicit `--config` path must exist.
/// - Otherwise `Deployer.toml` in the working directory is used if present,
///   and built-in defaults if not.
pub fn resolve(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_and_validate(path);
    }

    let fallback = default_config_path();
    if fallback.is_file() {
        debug!(path = ?fallback, "loading default settings file");
        load_and_validate(&fallback)
    } else {
        Ok(Settings::default())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Deployer.toml")
}

//! Persistent storage
//!
//! Locates and reads the on-disk server configuration.

pub mod settings;

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Could not determine the platform config directory")]
    NoConfigDir,
}

/// Platform config directory for gherkinrs
pub fn get_config_dir() -> Result<PathBuf, StorageError> {
    ProjectDirs::from("", "", "gherkinrs")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(StorageError::NoConfigDir)
}

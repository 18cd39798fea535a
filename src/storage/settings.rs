//! Configuration loading
//!
//! Layers, lowest precedence first: defaults, JSON config file, environment.
//! Command line flags are applied on top by the binary.

use crate::storage::{get_config_dir, StorageError};
use crate::types::config::ServerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default config file location
fn get_config_path() -> Result<PathBuf, StorageError> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Load the server configuration
///
/// An explicit `path` must exist. Without one, the platform config file is
/// used when present, otherwise defaults.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, StorageError> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(StorageError::NotFound(path.to_path_buf()));
            }
            read_config_file(path)?
        }
        None => match get_config_path() {
            Ok(default_path) if default_path.exists() => read_config_file(&default_path)?,
            Ok(_) => {
                tracing::info!("Config file not found, using defaults");
                ServerConfig::default()
            }
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                ServerConfig::default()
            }
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate();
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ServerConfig, StorageError> {
    let json = fs::read_to_string(path)?;
    let config: ServerConfig = serde_json::from_str(&json)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse an environment value, ignoring it with a warning when malformed
fn parse_env<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {}='{}', ignoring", key, raw);
            None
        }
    }
}

fn parse_bool(key: &str, raw: Option<String>) -> Option<bool> {
    let raw = raw?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        "" => None,
        _ => {
            tracing::warn!("Invalid {}='{}', ignoring", key, raw);
            None
        }
    }
}

/// Apply `GHERKIN_*` variables from `lookup` onto `config`
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    macro_rules! env_override {
        ($key:literal, $field:expr) => {
            if let Some(value) = parse_env($key, lookup($key)) {
                $field = value;
            }
        };
    }

    if let Some(host) = lookup("GHERKIN_HOST").filter(|h| !h.trim().is_empty()) {
        config.host = host.trim().to_string();
    }
    if let Some(path) = lookup("GHERKIN_MODEL_PATH").filter(|p| !p.trim().is_empty()) {
        config.model_path = PathBuf::from(path.trim());
    }
    if let Some(preload) = parse_bool("GHERKIN_PRELOAD", lookup("GHERKIN_PRELOAD")) {
        config.preload = preload;
    }
    if let Some(threads) = parse_env::<u32>("GHERKIN_THREADS", lookup("GHERKIN_THREADS")) {
        config.generation.threads = Some(threads);
    }

    env_override!("GHERKIN_PORT", config.port);
    env_override!("GHERKIN_MAX_CONCURRENT", config.max_concurrent);
    env_override!("GHERKIN_TIMEOUT", config.request_timeout_secs);
    env_override!("GHERKIN_CTX_SIZE", config.generation.context_size);
    env_override!("GHERKIN_TEMPERATURE", config.generation.temperature);
    env_override!("GHERKIN_TOP_P", config.generation.top_p);
    env_override!("GHERKIN_TOP_K", config.generation.top_k);
    env_override!("GHERKIN_REPEAT_PENALTY", config.generation.repeat_penalty);
    env_override!("GHERKIN_BATCH_SIZE", config.generation.batch_size);
    env_override!("GHERKIN_GPU_LAYERS", config.generation.gpu_layers);
    env_override!("GHERKIN_MAX_TOKENS", config.generation.max_tokens);
}

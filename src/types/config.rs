//! Configuration types
//!
//! Server and inference configuration structures.

use crate::inference::GenerationParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default weights file, resolved against the working directory
pub const DEFAULT_MODEL_PATH: &str = "model_quantized.q4.gguf";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Path to the GGUF weights
    pub model_path: PathBuf,
    /// Load the model before accepting connections
    pub preload: bool,
    /// Requests allowed to run inference at the same time
    pub max_concurrent: usize,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Forward llama.cpp's own logs
    pub verbose: bool,
    /// Model handle parameters
    pub generation: GenerationParams,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            preload: true,
            max_concurrent: 1,
            request_timeout_secs: 300,
            verbose: false,
            generation: GenerationParams::default(),
        }
    }
}

impl ServerConfig {
    /// Validate configuration values
    ///
    /// Clamps sampling parameters into range and keeps batch and completion
    /// sizes inside the context window.
    pub fn validate(&mut self) {
        let defaults = GenerationParams::default();
        let params = &mut self.generation;

        // clamp() passes NaN through
        if !params.temperature.is_finite() {
            params.temperature = defaults.temperature;
        }
        if !params.top_p.is_finite() {
            params.top_p = defaults.top_p;
        }
        if !params.repeat_penalty.is_finite() || params.repeat_penalty <= 0.0 {
            params.repeat_penalty = defaults.repeat_penalty;
        }
        params.temperature = params.temperature.clamp(0.0, 2.0);
        params.top_p = params.top_p.clamp(0.0, 1.0);
        params.penalty_last_n = params.penalty_last_n.max(-1);

        if params.context_size == 0 {
            params.context_size = defaults.context_size;
        }

        params.batch_size = params.batch_size.clamp(1, params.context_size);

        if params.max_tokens == 0 {
            params.max_tokens = defaults.max_tokens;
        }
        // Completion can't use the whole window, the prompt needs room too
        if params.max_tokens >= params.context_size {
            tracing::warn!(
                "max_tokens {} does not fit a {} token context, capping to {}",
                params.max_tokens,
                params.context_size,
                params.context_size / 2
            );
            params.max_tokens = (params.context_size / 2).max(1);
        }

        params.threads = match params.threads {
            Some(0) => None,
            Some(threads) => Some(threads.min(i32::MAX as u32)),
            None => None,
        };

        if self.max_concurrent == 0 {
            self.max_concurrent = 1;
        }

        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = 300;
        }

        if self.host.trim().is_empty() {
            self.host = "0.0.0.0".to_string();
        }
    }

    /// `host:port` string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.model_path, PathBuf::from("model_quantized.q4.gguf"));
        assert!(config.preload);
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.generation, GenerationParams::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();

        config.generation.temperature = 5.0;
        config.generation.top_p = -0.5;
        config.validate();
        assert_eq!(config.generation.temperature, 2.0);
        assert_eq!(config.generation.top_p, 0.0);

        config.generation.batch_size = 0;
        config.validate();
        assert_eq!(config.generation.batch_size, 1);

        config.generation.batch_size = 4096;
        config.validate();
        assert_eq!(config.generation.batch_size, 512);

        config.generation.max_tokens = 2048;
        config.validate();
        assert_eq!(config.generation.max_tokens, 256);

        config.max_concurrent = 0;
        config.request_timeout_secs = 0;
        config.generation.threads = Some(0);
        config.validate();
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.generation.threads.is_none());
    }

    #[test]
    fn test_non_finite_sampling_values_fall_back_to_defaults() {
        let mut config = ServerConfig::default();
        config.generation.temperature = f32::NAN;
        config.generation.top_p = f32::INFINITY;
        config.generation.repeat_penalty = f32::NAN;
        config.validate();

        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.generation.top_p, 0.95);
        assert_eq!(config.generation.repeat_penalty, 1.1);
    }

    #[test]
    fn test_threads_fit_in_i32() {
        let mut config = ServerConfig::default();
        config.generation.threads = Some(u32::MAX);
        config.validate();
        assert_eq!(config.generation.threads, Some(i32::MAX as u32));

        config.generation.threads = Some(8);
        config.validate();
        assert_eq!(config.generation.threads, Some(8));
    }

    #[test]
    fn test_config_serialization() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: ServerConfig = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(config.port, deserialized.port);
        assert_eq!(config.generation, deserialized.generation);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port": 9000, "generation": {"gpu_layers": 20}}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.generation.gpu_layers, 20);
        assert_eq!(config.generation.context_size, 512);
        assert_eq!(config.host, "0.0.0.0");
    }
}

//! Command line flags
//!
//! Flags override the config file and `GHERKIN_*` environment variables.

use clap::Parser;
use std::path::PathBuf;

use crate::types::config::ServerConfig;

/// Gherkin scenario generator backed by a local GGUF model
#[derive(Debug, Parser)]
#[command(name = "gherkinrs", version, about)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the GGUF model weights
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Layers to offload to the GPU
    #[arg(long)]
    pub gpu_layers: Option<u32>,

    /// Number of CPU threads
    #[arg(short, long)]
    pub threads: Option<u32>,

    /// Load the model on the first request instead of at startup
    #[arg(long)]
    pub lazy: bool,

    /// Let llama.cpp write its own logs
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply the flags that were given onto `config`
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(layers) = self.gpu_layers {
            config.generation.gpu_layers = layers;
        }
        if let Some(threads) = self.threads {
            config.generation.threads = Some(threads);
        }
        if self.lazy {
            config.preload = false;
        }
        if self.verbose {
            config.verbose = true;
        }
    }
}

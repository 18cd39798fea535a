//! llama.cpp backed text generation
//!
//! `LlamaEngine` loads a GGUF model once and hands out a `TextGenerator`
//! that runs one completion per call on the calling (blocking) thread.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::DecodeError;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{validate_gguf, ModelError};

/// llama.cpp treats this seed as "pick a random one"
pub const RANDOM_SEED: u32 = 0xFFFF_FFFF;

/// Errors crossing the inference boundary
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Invalid model file: {0}")]
    InvalidModel(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Prompt is {tokens} tokens but the context window holds {limit}")]
    PromptTooLong { tokens: usize, limit: u32 },
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model returned an empty completion")]
    EmptyCompletion,
    #[error("Generation cancelled")]
    Cancelled,
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotFound(path) => EngineError::ModelNotFound(path),
            other => EngineError::InvalidModel(other.to_string()),
        }
    }
}

/// Sampling and context parameters for the model handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Context window in tokens (prompt + completion)
    pub context_size: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Candidates kept before nucleus sampling (<= 0 disables)
    pub top_k: i32,
    /// Penalty applied to recently generated tokens (1.0 disables)
    pub repeat_penalty: f32,
    /// Window of recent tokens the penalty looks at
    pub penalty_last_n: i32,
    /// Tokens submitted per decode call
    pub batch_size: u32,
    /// Layers offloaded to an accelerator (0 = CPU only)
    pub gpu_layers: u32,
    /// Maximum completion length in tokens
    pub max_tokens: u32,
    /// Sampler seed, `RANDOM_SEED` for a fresh one per run
    pub seed: u32,
    /// CPU threads, runtime default when unset
    pub threads: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            context_size: 512,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
            penalty_last_n: 64,
            batch_size: 8,
            gpu_layers: 0,
            max_tokens: 256,
            seed: RANDOM_SEED,
            threads: None,
        }
    }
}

/// A loaded model able to complete a prompt.
///
/// Implementations block for the whole generation; callers run them on a
/// blocking worker.
pub trait TextGenerator: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        cancel: &AtomicBool,
    ) -> Result<String, EngineError>;
}

/// Builds the model handle. Called at most once per successful load.
pub trait ModelLoader: Send + Sync {
    fn load(&self, params: &GenerationParams) -> Result<Arc<dyn TextGenerator>, EngineError>;

    /// Human readable location of the weights, for logs and health output
    fn source(&self) -> String;
}

// llama.cpp allows a single backend init per process
static BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

fn backend(verbose: bool) -> Result<&'static LlamaBackend, EngineError> {
    BACKEND.get_or_try_init(|| {
        let mut backend =
            LlamaBackend::init().map_err(|e| EngineError::Backend(e.to_string()))?;
        if !verbose {
            backend.void_logs();
        }
        tracing::debug!("llama.cpp backend initialized");
        Ok(backend)
    })
}

/// Loads GGUF weights from disk through llama.cpp
#[derive(Debug, Clone)]
pub struct LlamaEngine {
    model_path: PathBuf,
    verbose: bool,
}

impl LlamaEngine {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            verbose: false,
        }
    }

    /// Let llama.cpp write its own logs
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl ModelLoader for LlamaEngine {
    fn load(&self, params: &GenerationParams) -> Result<Arc<dyn TextGenerator>, EngineError> {
        let header = validate_gguf(&self.model_path)?;
        tracing::info!(
            "Loading model {} (GGUF v{}, {} tensors, {} MB)",
            self.model_path.display(),
            header.version,
            header.tensor_count,
            header.file_size / 1024 / 1024
        );

        let backend = backend(self.verbose)?;
        let model_params = LlamaModelParams::default().with_n_gpu_layers(params.gpu_layers);
        let model = LlamaModel::load_from_file(backend, &self.model_path, &model_params)
            .map_err(|e| EngineError::Backend(format!("failed to load model: {e}")))?;

        tracing::info!(
            "Model loaded: ctx={}, batch={}, gpu_layers={}",
            params.context_size,
            params.batch_size,
            params.gpu_layers
        );

        let generator: Arc<dyn TextGenerator> = Arc::new(LlamaGenerator { backend, model });
        Ok(generator)
    }

    fn source(&self) -> String {
        self.model_path.display().to_string()
    }
}

/// Model weights plus the backend they were loaded with.
///
/// A fresh llama context is created per completion so the KV cache never
/// carries over between requests.
pub struct LlamaGenerator {
    backend: &'static LlamaBackend,
    model: LlamaModel,
}

impl LlamaGenerator {
    fn new_context(&self, params: &GenerationParams) -> Result<LlamaContext<'_>, EngineError> {
        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(params.context_size))
            .with_n_batch(params.batch_size);
        if let Some(threads) = params.threads {
            let threads = i32::try_from(threads).unwrap_or(i32::MAX);
            ctx_params = ctx_params
                .with_n_threads(threads)
                .with_n_threads_batch(threads);
        }

        self.model
            .new_context(self.backend, ctx_params)
            .map_err(|e| EngineError::Backend(format!("failed to create context: {e}")))
    }
}

fn decode(ctx: &mut LlamaContext<'_>, batch: &mut LlamaBatch) -> Result<(), EngineError> {
    ctx.decode(batch).map_err(|e| match e {
        DecodeError::NoKvCacheSlot => {
            EngineError::ResourceExhausted("no KV cache slot available".to_string())
        }
        other => EngineError::Inference(format!("decode failed: {other}")),
    })
}

fn add_token(
    batch: &mut LlamaBatch,
    token: llama_cpp_2::token::LlamaToken,
    pos: usize,
    logits: bool,
) -> Result<(), EngineError> {
    batch
        .add(token, pos as i32, &[0], logits)
        .map_err(|e| EngineError::Inference(format!("batch add failed: {e}")))
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), EngineError> {
    if cancel.load(Ordering::Relaxed) {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

impl TextGenerator for LlamaGenerator {
    #[allow(deprecated)]
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        cancel: &AtomicBool,
    ) -> Result<String, EngineError> {
        let mut ctx = self.new_context(params)?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| EngineError::Inference(format!("tokenization failed: {e}")))?;
        if tokens.is_empty() {
            return Err(EngineError::Inference("prompt produced no tokens".to_string()));
        }
        if tokens.len() >= params.context_size as usize {
            return Err(EngineError::PromptTooLong {
                tokens: tokens.len(),
                limit: params.context_size,
            });
        }
        tracing::debug!("Prompt: {} tokens", tokens.len());

        // decode() rejects batches larger than n_batch, so feed the prompt in slices
        let batch_size = params.batch_size.max(1) as usize;
        let mut batch = LlamaBatch::new(batch_size, 1);
        let last = tokens.len() - 1;
        for (chunk_index, chunk) in tokens.chunks(batch_size).enumerate() {
            check_cancel(cancel)?;
            batch.clear();
            for (offset, token) in chunk.iter().enumerate() {
                let pos = chunk_index * batch_size + offset;
                add_token(&mut batch, *token, pos, pos == last)?;
            }
            decode(&mut ctx, &mut batch)?;
        }

        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::penalties(
                params.penalty_last_n,
                params.repeat_penalty,
                0.0,
                0.0,
            ),
            LlamaSampler::top_k(params.top_k),
            LlamaSampler::top_p(params.top_p, 1),
            LlamaSampler::temp(params.temperature),
            LlamaSampler::dist(params.seed),
        ]);

        let mut pos = tokens.len();
        let mut generated = 0u32;
        // Bytes, not strings: a multi-byte character may span two tokens
        let mut output: Vec<u8> = Vec::new();

        while generated < params.max_tokens && pos < params.context_size as usize {
            check_cancel(cancel)?;

            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);
            if self.model.is_eog_token(token) {
                break;
            }

            let piece = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| EngineError::Inference(format!("detokenize failed: {e}")))?;
            output.extend_from_slice(&piece);
            generated += 1;

            batch.clear();
            add_token(&mut batch, token, pos, true)?;
            pos += 1;
            decode(&mut ctx, &mut batch)?;
        }

        tracing::debug!("Generated {} tokens", generated);
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_match_service_constants() {
        let params = GenerationParams::default();
        assert_eq!(params.context_size, 512);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.top_p, 0.95);
        assert_eq!(params.top_k, 40);
        assert_eq!(params.repeat_penalty, 1.1);
        assert_eq!(params.penalty_last_n, 64);
        assert_eq!(params.batch_size, 8);
        assert_eq!(params.gpu_layers, 0);
        assert_eq!(params.max_tokens, 256);
        assert_eq!(params.seed, RANDOM_SEED);
        assert!(params.threads.is_none());
    }

    #[test]
    fn test_params_partial_deserialization() {
        let params: GenerationParams =
            serde_json::from_str(r#"{"temperature": 0.2, "threads": 4}"#).unwrap();
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.threads, Some(4));
        assert_eq!(params.context_size, 512);
    }

    #[test]
    fn test_model_error_conversion() {
        let missing: EngineError = ModelError::NotFound(PathBuf::from("m.gguf")).into();
        assert!(matches!(missing, EngineError::ModelNotFound(_)));

        let bad: EngineError = ModelError::BadMagic(PathBuf::from("m.gguf")).into();
        assert!(matches!(bad, EngineError::InvalidModel(_)));
    }

    #[test]
    fn test_missing_model_fails_before_backend_init() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LlamaEngine::new(dir.path().join("model_quantized.q4.gguf"));
        let result = engine.load(&GenerationParams::default());
        assert!(matches!(result, Err(EngineError::ModelNotFound(_))));
        assert!(engine.source().ends_with("model_quantized.q4.gguf"));
    }

    #[test]
    fn test_check_cancel() {
        let flag = AtomicBool::new(false);
        assert!(check_cancel(&flag).is_ok());
        flag.store(true, Ordering::Relaxed);
        assert!(matches!(check_cancel(&flag), Err(EngineError::Cancelled)));
    }
}

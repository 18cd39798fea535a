//! Inference gateway
//!
//! Owns the model handle and turns a user story into a completion. The handle
//! is built on first use (or on `warm_up`) behind a one-shot initializer, so
//! concurrent first requests share a single load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{OnceCell, OwnedSemaphorePermit};

use crate::inference::{EngineError, GenerationParams, ModelLoader, TextGenerator};
use crate::prompt::format_prompt;

pub struct InferenceGateway {
    loader: Arc<dyn ModelLoader>,
    params: GenerationParams,
    handle: OnceCell<Arc<dyn TextGenerator>>,
}

impl InferenceGateway {
    pub fn new(loader: Arc<dyn ModelLoader>, params: GenerationParams) -> Self {
        Self {
            loader,
            params,
            handle: OnceCell::new(),
        }
    }

    /// Where the weights come from
    pub fn model_source(&self) -> String {
        self.loader.source()
    }

    /// Whether the model handle has been constructed
    pub fn is_ready(&self) -> bool {
        self.handle.initialized()
    }

    /// Construct the model handle now instead of on the first request.
    pub async fn warm_up(&self) -> Result<(), EngineError> {
        self.handle().await.map(|_| ())
    }

    /// Generate a Gherkin scenario for a user story.
    pub async fn generate(&self, user_story: &str) -> Result<String, EngineError> {
        self.generate_with_cancel(user_story, Arc::new(AtomicBool::new(false)), None)
            .await
    }

    /// Like `generate`, stopping early once `cancel` is set.
    ///
    /// `permit` is released only when the blocking worker returns, not when
    /// the calling future is dropped.
    pub async fn generate_with_cancel(
        &self,
        user_story: &str,
        cancel: Arc<AtomicBool>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<String, EngineError> {
        let generator = self.handle().await?;
        let prompt = format_prompt(user_story);
        let params = self.params.clone();
        tracing::debug!("Formatted prompt: {} bytes", prompt.len());

        let text = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            generator.generate(&prompt, &params, &cancel)
        })
        .await
        .map_err(|e| EngineError::Worker(e.to_string()))??;

        if text.is_empty() {
            tracing::warn!("Model produced an empty completion");
            return Err(EngineError::EmptyCompletion);
        }

        Ok(text)
    }

    // A failed load leaves the cell empty, so the next caller retries.
    async fn handle(&self) -> Result<Arc<dyn TextGenerator>, EngineError> {
        self.handle
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let params = self.params.clone();
                tracing::info!("Constructing model handle from {}", loader.source());
                tokio::task::spawn_blocking(move || loader.load(&params))
                    .await
                    .map_err(|e| EngineError::Worker(e.to_string()))?
            })
            .await
            .map(Arc::clone)
            .map_err(|e| {
                tracing::error!("Model construction failed: {}", e);
                e
            })
    }
}

/// Sets the flag when dropped, so an abandoned request stops its worker
pub struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

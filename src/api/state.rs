//! Application state shared by the handlers

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::api::error::ApiError;
use crate::gateway::InferenceGateway;

/// Shared application state with admission control
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<InferenceGateway>,
    /// Limits how many requests run inference at once; the rest queue here
    pub request_semaphore: Arc<Semaphore>,
    /// Generation timeout (seconds)
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new(gateway: InferenceGateway, max_concurrent: usize, request_timeout_secs: u64) -> Self {
        Self {
            gateway: Arc::new(gateway),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            request_timeout_secs,
        }
    }

    /// Acquire a permit for inference
    ///
    /// The permit is owned so it can travel with the blocking worker and
    /// outlive a dropped request.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        Arc::clone(&self.request_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ApiError::unavailable("Server is shutting down"))
    }
}

//! Gherkin generation endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::gateway::CancelOnDrop;
use crate::types::gherkin::{GherkinResponse, UserStoryRequest};

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<UserStoryRequest>, JsonRejection>,
) -> Result<Json<GherkinResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        ApiError::from(rejection)
    })?;

    let span = tracing::info_span!("generate_gherkin", request_id = %Uuid::new_v4());
    async move {
        tracing::info!("User story received ({} chars)", req.user_story.chars().count());

        let permit = state.acquire_permit().await?;

        // Load time is not part of the generation budget
        state.gateway.warm_up().await?;

        let cancel = Arc::new(AtomicBool::new(false));
        // Fires on client disconnect too, when axum drops this future
        let _cancel_guard = CancelOnDrop::new(Arc::clone(&cancel));
        let timeout = Duration::from_secs(state.request_timeout_secs);
        let result = tokio::time::timeout(
            timeout,
            state
                .gateway
                .generate_with_cancel(&req.user_story, Arc::clone(&cancel), Some(permit)),
        )
        .await;

        match result {
            Ok(Ok(gherkin)) => {
                tracing::info!("Generated {} bytes", gherkin.len());
                Ok(Json(GherkinResponse { gherkin }))
            }
            Ok(Err(err)) => {
                tracing::error!("Generation failed: {}", err);
                Err(err.into())
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                tracing::warn!("Generation timed out after {}s", state.request_timeout_secs);
                Err(ApiError::timeout("Gherkin generation timed out"))
            }
        }
    }
    .instrument(span)
    .await
}

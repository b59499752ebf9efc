use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::ApiError,
    models::settings::{AiSettingsResponse, UpdateAiSettingsRequest},
    services::AppState,
};

pub async fn get_ai_settings(State(state): State<Arc<AppState>>) -> Json<AiSettingsResponse> {
    Json(state.ai_settings_summary().await)
}

/// Replaces the model, timeout or API key in memory. Nothing is persisted.
pub async fn update_ai_settings(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<UpdateAiSettingsRequest>,
) -> Result<Json<AiSettingsResponse>, ApiError> {
    req.validate()?;

    if !state.update_ai_settings(req).await {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "AI backend {} does not accept a new credential",
            state.gateway.backend_name()
        )));
    }

    let summary = state.ai_settings_summary().await;
    tracing::info!(
        "AI settings updated: model={} timeout={}s credential_epoch={}",
        summary.model_id,
        summary.timeout_secs,
        summary.credential_epoch
    );
    Ok(Json(summary))
}

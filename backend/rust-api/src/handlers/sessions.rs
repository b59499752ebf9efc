use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::ApiError,
    models::{session::SessionView, solution::SubmitSolutionRequest, GenerateTicketRequest},
    services::{session_service::SessionHandle, AppState},
};

async fn find(state: &AppState, session_id: &str) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.sessions.create().await;
    let view = handle.lock().await.view();
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = find(&state, &session_id).await?;
    let session = handle.lock().await;
    Ok(Json(session.view()))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Session {} not found",
            session_id
        )))
    }
}

pub async fn generate_ticket(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<GenerateTicketRequest>,
) -> Result<Json<SessionView>, ApiError> {
    tracing::info!(
        "Generating {} ticket for session: {}",
        req.difficulty,
        session_id
    );

    let handle = find(&state, &session_id).await?;
    let workflow = state.workflow().await;

    // Held across the AI call so overlapping requests on one session run one at a time.
    let mut session = handle.lock().await;
    session.touch();
    workflow.generate(&mut session, req.difficulty).await?;
    Ok(Json(session.view()))
}

pub async fn reset_ticket(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = find(&state, &session_id).await?;
    let workflow = state.workflow().await;

    let mut session = handle.lock().await;
    session.touch();
    workflow.reset(&mut session);
    Ok(Json(session.view()))
}

pub async fn submit_solution(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitSolutionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    req.validate()?;

    let handle = find(&state, &session_id).await?;
    let workflow = state.workflow().await;

    let mut session = handle.lock().await;
    session.touch();
    if !workflow.submit_solution(&mut session, &req.text)? {
        tracing::debug!("Session {} resubmitted an identical solution", session_id);
    }
    Ok(Json(session.view()))
}

pub async fn request_hint(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    tracing::info!("Requesting hint for session: {}", session_id);

    let handle = find(&state, &session_id).await?;
    let workflow = state.workflow().await;

    let mut session = handle.lock().await;
    session.touch();
    workflow.request_hint(&mut session).await?;
    Ok(Json(session.view()))
}

pub async fn request_evaluation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    tracing::info!("Requesting evaluation for session: {}", session_id);

    let handle = find(&state, &session_id).await?;
    let workflow = state.workflow().await;

    let mut session = handle.lock().await;
    session.touch();
    workflow.request_evaluation(&mut session).await?;
    Ok(Json(session.view()))
}

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::response_parser::ParseFailure;
use crate::services::workflow::{AiFailure, WorkflowError};
use crate::services::AppState;

pub mod sessions;
pub mod settings;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ai = state.ai_settings_summary().await;
    let status = if ai.credential_configured {
        "healthy"
    } else {
        "degraded"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "service": "ticket-trainer-api",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": state.sessions.len().await,
            "ai": ai,
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Failure body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation(String),
    Unauthorized,
    NotFound(String),
    Workflow(WorkflowError),
    Internal(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Workflow(e) => match e {
                WorkflowError::NoTicket | WorkflowError::NoSolution => StatusCode::CONFLICT,
                WorkflowError::EmptySolution => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::Ai(AiFailure::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
                WorkflowError::Ai(AiFailure::Auth(_)) => StatusCode::UNAUTHORIZED,
                WorkflowError::Ai(AiFailure::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                WorkflowError::Ai(AiFailure::Network(_))
                | WorkflowError::Ai(AiFailure::Upstream(_))
                | WorkflowError::Parse(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(message) => plain("bad_request", message.clone()),
            ApiError::Validation(message) => plain("validation", message.clone()),
            ApiError::Unauthorized => plain("unauthorized", "Unauthorized".to_string()),
            ApiError::NotFound(message) => plain("not_found", message.clone()),
            ApiError::Workflow(e) => ErrorBody {
                kind: e.kind(),
                message: e.to_string(),
                retryable: e.is_retryable(),
                retry_after_secs: e.retry_after().map(|d| d.as_secs()),
                excerpt: match e {
                    WorkflowError::Parse(ParseFailure { excerpt, .. }) => Some(excerpt.clone()),
                    _ => None,
                },
            },
            ApiError::Internal(_) => plain("internal", "Internal server error".to_string()),
        }
    }
}

fn plain(kind: &'static str, message: String) -> ErrorBody {
    ErrorBody {
        kind,
        message,
        retryable: false,
        retry_after_secs: None,
        excerpt: None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            tracing::error!("Internal error: {:#}", e);
        }

        let body = self.body();
        let mut response = (self.status(), Json(&body)).into_response();
        if let Some(secs) = body.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

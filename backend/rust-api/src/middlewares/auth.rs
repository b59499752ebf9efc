use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use crate::handlers::ApiError;
use crate::services::AppState;

/// Extracts `username:password` from an HTTP Basic `Authorization` header.
fn basic_credentials(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;
    let encoded = auth_header.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    String::from_utf8(decoded).ok()
}

fn check(headers: &HeaderMap, expected: &str) -> bool {
    matches!(basic_credentials(headers), Some(credentials) if credentials == expected)
}

/// Protects `/metrics` with HTTP Basic Auth (`METRICS_AUTH`)
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !check(&headers, &state.config.metrics_auth) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

/// Protects the settings endpoints with HTTP Basic Auth (`ADMIN_AUTH`)
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !check(&headers, &state.config.admin_auth) {
        tracing::warn!("Rejected settings request with missing or invalid credentials");
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn decodes_basic_credentials() {
        let encoded = general_purpose::STANDARD.encode("admin:secret");
        let headers = headers(&format!("Basic {}", encoded));
        assert_eq!(basic_credentials(&headers).as_deref(), Some("admin:secret"));
        assert!(check(&headers, "admin:secret"));
        assert!(!check(&headers, "admin:other"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(basic_credentials(&headers("Bearer token")).is_none());
        assert!(basic_credentials(&headers("Basic !!!")).is_none());
        assert!(basic_credentials(&HeaderMap::new()).is_none());
    }
}

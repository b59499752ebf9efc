#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_trainer_api::{
    config::Config,
    create_router,
    services::{
        ai_gateway::{AiBackend, AiRequest, RawResult},
        AppState,
    },
};
use tower::ServiceExt;

pub const ADMIN_AUTH: &str = "admin:test-admin";
pub const METRICS_AUTH: &str = "metrics:test-metrics";

pub const TICKET_JSON: &str = r#"{
  "title": "Shared drive not mapping at login",
  "description": "Since this morning the S: drive is missing when I log in. Other colleagues have it.",
  "category": "Network",
  "requester": "Jordan from Accounting"
}"#;

/// AI backend that answers from a fixed script and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<RawResult>>,
    requests: Mutex<Vec<AiRequest>>,
    calls: AtomicUsize,
    epoch: AtomicU64,
}

impl ScriptedBackend {
    pub fn new(script: Vec<RawResult>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn push(&self, result: RawResult) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    async fn complete(&self, request: &AiRequest, _timeout: Duration) -> RawResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RawResult::UpstreamError("script exhausted".to_string()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn credential_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn replace_credential(&self, _api_key: String) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        true
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.ai.api_key = "test-key".to_string();
    config.ai.model_id = "gemini-test".to_string();
    config.ai.retry_backoff_ms = 1;
    config.metrics_auth = METRICS_AUTH.to_string();
    config.admin_auth = ADMIN_AUTH.to_string();
    config
}

pub fn create_test_app(script: Vec<RawResult>) -> (Router, Arc<ScriptedBackend>) {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let backend = ScriptedBackend::new(script);
    let app_state = Arc::new(AppState::with_backend(test_config(), backend.clone()));
    (create_router(app_state), backend)
}

pub fn basic(credentials: &str) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(credentials))
}

/// Sends a request and returns the status plus the parsed JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!(
                "non-JSON body for {} {}: {}",
                method,
                uri,
                String::from_utf8_lossy(&bytes)
            )
        })
    };
    (status, json)
}

pub async fn create_session(app: &Router) -> String {
    let (status, json) = send(app, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    json["session_id"].as_str().unwrap().to_string()
}

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::metrics::{AI_REQUESTS_TOTAL, AI_REQUEST_DURATION_SECONDS, AI_RETRIES_TOTAL};
use crate::models::Operation;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const DETAIL_CHARS: usize = 300;

/// Outcome of one exchange with the model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResult {
    Ok(String),
    RateLimited { retry_after: Option<Duration> },
    AuthError(String),
    NetworkError(String),
    Timeout,
    UpstreamError(String),
}

impl RawResult {
    /// Network errors and timeouts get one automatic retry; everything else is surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(self, RawResult::NetworkError(_) | RawResult::Timeout)
    }

    pub fn outcome_label(&self) -> &'static str {
        match self {
            RawResult::Ok(_) => "ok",
            RawResult::RateLimited { .. } => "rate_limited",
            RawResult::AuthError(_) => "auth_error",
            RawResult::NetworkError(_) => "network_error",
            RawResult::Timeout => "timeout",
            RawResult::UpstreamError(_) => "upstream_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationOptions {
    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Generate => Self {
                temperature: 0.3,
                max_output_tokens: 300,
            },
            Operation::Hint => Self {
                temperature: 0.2,
                max_output_tokens: 400,
            },
            Operation::Evaluate => Self {
                temperature: 0.1,
                max_output_tokens: 200,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiRequest {
    pub operation: Operation,
    pub prompt: String,
    pub model_id: String,
    pub options: GenerationOptions,
}

impl AiRequest {
    pub fn new(operation: Operation, prompt: String, model_id: impl Into<String>) -> Self {
        Self {
            operation,
            prompt,
            model_id: model_id.into(),
            options: GenerationOptions::for_operation(operation),
        }
    }
}

/// A single request/response exchange with a model provider. Implementations classify
/// their own failures and never retry.
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn complete(&self, request: &AiRequest, timeout: Duration) -> RawResult;

    fn name(&self) -> &'static str;

    fn has_credential(&self) -> bool {
        true
    }

    /// Changes whenever the credential is replaced.
    fn credential_epoch(&self) -> u64 {
        0
    }

    /// Returns false when the backend has no replaceable credential.
    fn replace_credential(&self, _api_key: String) -> bool {
        false
    }
}

/// Applies the timeout and retry policy around a backend. Holds no session state.
#[derive(Clone)]
pub struct AiGateway {
    backend: Arc<dyn AiBackend>,
    retry: RetryConfig,
}

impl AiGateway {
    pub fn new(backend: Arc<dyn AiBackend>, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn has_credential(&self) -> bool {
        self.backend.has_credential()
    }

    pub fn credential_epoch(&self) -> u64 {
        self.backend.credential_epoch()
    }

    pub fn replace_credential(&self, api_key: String) -> bool {
        self.backend.replace_credential(api_key)
    }

    pub async fn send(&self, request: &AiRequest, timeout: Duration) -> RawResult {
        let operation = request.operation.as_str();
        let started = Instant::now();
        let calls = AtomicUsize::new(0);
        let backend = &self.backend;

        tracing::debug!(
            "Dispatching {} prompt ({} chars) to {} model={}",
            operation,
            request.prompt.len(),
            backend.name(),
            request.model_id
        );

        let result = retry_async_with_config(self.retry.clone(), RawResult::is_transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match tokio::time::timeout(timeout, backend.complete(request, timeout)).await {
                    Ok(result) => result,
                    Err(_) => RawResult::Timeout,
                }
            }
        })
        .await;

        let retries = calls.load(Ordering::SeqCst).saturating_sub(1);
        if retries > 0 {
            AI_RETRIES_TOTAL
                .with_label_values(&[operation])
                .inc_by(retries as u64);
        }
        AI_REQUESTS_TOTAL
            .with_label_values(&[operation, result.outcome_label()])
            .inc();
        AI_REQUEST_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        if !matches!(result, RawResult::Ok(_)) {
            tracing::warn!(
                "AI {} request failed after {} call(s): {:?}",
                operation,
                retries + 1,
                result
            );
        }

        result
    }
}

/// Google Generative Language `generateContent` backend.
pub struct GeminiBackend {
    http: Client,
    base_url: String,
    api_key: RwLock<String>,
    epoch: AtomicU64,
}

impl GeminiBackend {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: RwLock::new(api_key.into()),
            epoch: AtomicU64::new(0),
        }
    }

    fn endpoint(&self, model_id: &str) -> String {
        // Catalog listings name models "models/<id>".
        let model = model_id.trim().trim_start_matches("models/");
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    fn current_key(&self) -> String {
        self.api_key
            .read()
            .map(|key| key.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AiBackend for GeminiBackend {
    async fn complete(&self, request: &AiRequest, timeout: Duration) -> RawResult {
        let api_key = self.current_key();
        if api_key.trim().is_empty() {
            return RawResult::AuthError("no API key configured".to_string());
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": request.options.temperature,
                "maxOutputTokens": request.options.max_output_tokens,
            },
        });

        let response = self
            .http
            .post(self.endpoint(&request.model_id))
            .header("x-goog-api-key", api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return classify_transport_error(&e),
        };

        if !status.is_success() {
            return classify_status(status, retry_after, &text);
        }

        extract_candidate_text(&text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn has_credential(&self) -> bool {
        !self.current_key().trim().is_empty()
    }

    fn credential_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn replace_credential(&self, api_key: String) -> bool {
        match self.api_key.write() {
            Ok(mut key) => {
                *key = api_key;
                self.epoch.fetch_add(1, Ordering::SeqCst);
                tracing::info!("AI provider credential replaced");
                true
            }
            Err(_) => false,
        }
    }
}

fn classify_transport_error(error: &reqwest::Error) -> RawResult {
    if error.is_timeout() {
        RawResult::Timeout
    } else {
        RawResult::NetworkError(error.to_string())
    }
}

/// Maps a non-success HTTP answer onto the failure taxonomy.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> RawResult {
    let lowered = body.to_ascii_lowercase();
    let detail = excerpt(body);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return RawResult::AuthError(detail);
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("quota")
        || lowered.contains("resource_exhausted")
    {
        return RawResult::RateLimited { retry_after };
    }
    if ["api key not valid", "api_key_invalid", "invalid api key", "malformed"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        return RawResult::AuthError(detail);
    }
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return RawResult::Timeout;
    }

    RawResult::UpstreamError(format!("HTTP {}: {}", status.as_u16(), detail))
}

/// Joins the text parts of the first candidate.
pub fn extract_candidate_text(body: &str) -> RawResult {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return RawResult::UpstreamError(format!("invalid response body: {}", e)),
    };

    let text = value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if !text.trim().is_empty() {
        return RawResult::Ok(text.trim().to_string());
    }

    if let Some(reason) = value["promptFeedback"]["blockReason"].as_str() {
        return RawResult::UpstreamError(format!("prompt blocked by provider: {}", reason));
    }
    if let Some(reason) = value["candidates"][0]["finishReason"].as_str() {
        return RawResult::UpstreamError(format!("no text returned (finish reason {})", reason));
    }
    RawResult::UpstreamError("response contained no candidate text".to_string())
}

fn excerpt(body: &str) -> String {
    body.trim().chars().take(DETAIL_CHARS).collect()
}

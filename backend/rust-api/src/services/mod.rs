use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::models::settings::{AiSettingsResponse, UpdateAiSettingsRequest};
use crate::utils::retry::RetryConfig;
use ai_gateway::{AiBackend, AiGateway, GeminiBackend};
use session_service::SessionStore;
use workflow::{AiSettings, WorkflowController};

pub struct AppState {
    pub config: Config,
    pub gateway: AiGateway,
    pub sessions: Arc<SessionStore>,
    pub ai_settings: RwLock<AiSettings>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let backend = GeminiBackend::new(http, config.ai.base_url.clone(), config.ai.api_key.clone());

        tracing::info!(
            "AI gateway configured: backend=gemini model={} timeout={}s",
            config.ai.model_id,
            config.ai.timeout_secs
        );

        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Builds the state around any backend; tests plug in a scripted one.
    pub fn with_backend(config: Config, backend: Arc<dyn AiBackend>) -> Self {
        let retry = RetryConfig::single_retry(Duration::from_millis(config.ai.retry_backoff_ms));
        let ai_settings = AiSettings {
            model_id: config.ai.model_id.clone(),
            timeout: Duration::from_secs(config.ai.timeout_secs),
            rate_limit_cooldown: Duration::from_secs(config.ai.rate_limit_cooldown_secs),
        };
        let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));

        Self {
            gateway: AiGateway::new(backend, retry),
            sessions: Arc::new(sessions),
            ai_settings: RwLock::new(ai_settings),
            config,
        }
    }

    /// A controller bound to a snapshot of the current AI settings.
    pub async fn workflow(&self) -> WorkflowController<'_> {
        let settings = self.ai_settings.read().await.clone();
        WorkflowController::new(&self.gateway, settings)
    }

    pub async fn ai_settings_summary(&self) -> AiSettingsResponse {
        let settings = self.ai_settings.read().await;
        AiSettingsResponse {
            backend: self.gateway.backend_name().to_string(),
            model_id: settings.model_id.clone(),
            timeout_secs: settings.timeout.as_secs(),
            credential_configured: self.gateway.has_credential(),
            credential_epoch: self.gateway.credential_epoch(),
        }
    }

    /// Applies an in-memory settings change. Returns false, leaving every setting as it was,
    /// when the backend refused a new key.
    pub async fn update_ai_settings(&self, req: UpdateAiSettingsRequest) -> bool {
        let mut settings = self.ai_settings.write().await;
        if let Some(api_key) = req.api_key {
            if !self.gateway.replace_credential(api_key) {
                tracing::warn!("AI backend {} refused the new API key", self.gateway.backend_name());
                return false;
            }
        }
        if let Some(model_id) = req.model_id {
            tracing::info!("AI model changed from {} to {}", settings.model_id, model_id);
            settings.model_id = model_id;
        }
        if let Some(timeout_secs) = req.timeout_secs {
            settings.timeout = Duration::from_secs(timeout_secs);
        }
        true
    }
}

pub mod ai_gateway;
pub mod prompt_builder;
pub mod response_parser;
pub mod session_service;
pub mod workflow;

#[cfg(test)]
mod tests {
    use super::*;
    use super::ai_gateway::{AiRequest, RawResult};
    use async_trait::async_trait;

    /// Backend whose key cannot be swapped at runtime.
    struct FixedKeyBackend;

    #[async_trait]
    impl AiBackend for FixedKeyBackend {
        async fn complete(&self, _request: &AiRequest, _timeout: Duration) -> RawResult {
            RawResult::UpstreamError("unused".to_string())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn state() -> AppState {
        let mut config = Config::default();
        config.ai.model_id = "gemini-test".to_string();
        config.ai.timeout_secs = 20;
        AppState::with_backend(config, Arc::new(FixedKeyBackend))
    }

    #[tokio::test]
    async fn refused_key_leaves_settings_untouched() {
        let state = state();

        let applied = state
            .update_ai_settings(UpdateAiSettingsRequest {
                api_key: Some("new-key".to_string()),
                model_id: Some("gemini-pro".to_string()),
                timeout_secs: Some(60),
            })
            .await;

        assert!(!applied);
        let summary = state.ai_settings_summary().await;
        assert_eq!(summary.model_id, "gemini-test");
        assert_eq!(summary.timeout_secs, 20);
        assert_eq!(summary.credential_epoch, 0);
    }

    #[tokio::test]
    async fn settings_without_key_apply() {
        let state = state();

        let applied = state
            .update_ai_settings(UpdateAiSettingsRequest {
                api_key: None,
                model_id: Some("gemini-pro".to_string()),
                timeout_secs: None,
            })
            .await;

        assert!(applied);
        let summary = state.ai_settings_summary().await;
        assert_eq!(summary.model_id, "gemini-pro");
        assert_eq!(summary.timeout_secs, 20);
    }
}

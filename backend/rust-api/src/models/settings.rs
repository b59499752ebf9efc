use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAiSettingsRequest {
    #[validate(length(min = 1, message = "api_key must not be empty"))]
    pub api_key: Option<String>,
    #[validate(length(min = 1, max = 200, message = "model_id must be 1-200 characters"))]
    pub model_id: Option<String>,
    #[validate(range(min = 1, max = 300, message = "timeout_secs must be between 1 and 300"))]
    pub timeout_secs: Option<u64>,
}

/// Settings as reported back to the caller. Never carries the credential itself.
#[derive(Debug, Serialize)]
pub struct AiSettingsResponse {
    pub backend: String,
    pub model_id: String,
    pub timeout_secs: u64,
    pub credential_configured: bool,
    pub credential_epoch: u64,
}

use serde::Deserialize;
use std::env;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL_ID: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub base_url: String,
    /// May be empty; requests then fail with an auth error until a key is supplied.
    pub api_key: String,
    pub model_id: String,
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub rate_limit_cooldown_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: String::new(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            timeout_secs: 30,
            retry_backoff_ms: 500,
            rate_limit_cooldown_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub ai: AiConfig,
    pub session_ttl_secs: u64,
    /// `username:password` for `/metrics`.
    pub metrics_auth: String,
    /// `username:password` for `/api/v1/settings`.
    pub admin_auth: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            ai: AiConfig::default(),
            session_ttl_secs: 3600,
            metrics_auth: "admin:changeme".to_string(),
            admin_auth: "admin:changeme".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let string = |key: &str, legacy: &str, fallback: String| {
            settings
                .get_string(key)
                .or_else(|_| env::var(legacy))
                .unwrap_or(fallback)
        };
        let number = |key: &str, legacy: &str, fallback: u64| -> Result<u64, config::ConfigError> {
            if let Ok(value) = settings.get_int(key) {
                return u64::try_from(value)
                    .map_err(|_| config::ConfigError::Message(format!("{} must not be negative", key)));
            }
            match env::var(legacy) {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    config::ConfigError::Message(format!("{} must be a number, got {:?}", legacy, raw))
                }),
                Err(_) => Ok(fallback),
            }
        };

        let ai = AiConfig {
            base_url: string("ai.base_url", "GEMINI_BASE_URL", defaults.ai.base_url),
            api_key: string("ai.api_key", "GEMINI_API_KEY", defaults.ai.api_key),
            model_id: string("ai.model_id", "AI_MODEL_ID", defaults.ai.model_id),
            timeout_secs: number("ai.timeout_secs", "AI_TIMEOUT_SECS", defaults.ai.timeout_secs)?,
            retry_backoff_ms: number(
                "ai.retry_backoff_ms",
                "AI_RETRY_BACKOFF_MS",
                defaults.ai.retry_backoff_ms,
            )?,
            rate_limit_cooldown_secs: number(
                "ai.rate_limit_cooldown_secs",
                "AI_RATE_LIMIT_COOLDOWN_SECS",
                defaults.ai.rate_limit_cooldown_secs,
            )?,
        };

        if ai.api_key.trim().is_empty() {
            eprintln!("WARNING: GEMINI_API_KEY is not set, AI requests will fail until a key is configured");
        }
        if ai.timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "ai.timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            bind_addr: string("server.bind_addr", "BIND_ADDR", defaults.bind_addr),
            ai,
            session_ttl_secs: number(
                "session.ttl_secs",
                "SESSION_TTL_SECONDS",
                defaults.session_ttl_secs,
            )?,
            metrics_auth: string("metrics.auth", "METRICS_AUTH", defaults.metrics_auth),
            admin_auth: string("admin.auth", "ADMIN_AUTH", defaults.admin_auth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "GEMINI_API_KEY",
        "AI_MODEL_ID",
        "AI_TIMEOUT_SECS",
        "SESSION_TTL_SECONDS",
        "BIND_ADDR",
        "SKIP_ROOT_ENV",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn legacy_env_vars_are_honored() {
        clear();
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("GEMINI_API_KEY", "test-key");
        env::set_var("AI_MODEL_ID", "gemini-test");
        env::set_var("AI_TIMEOUT_SECS", "12");
        env::set_var("SESSION_TTL_SECONDS", "90");

        let config = Config::load().unwrap();
        assert_eq!(config.ai.api_key, "test-key");
        assert_eq!(config.ai.model_id, "gemini-test");
        assert_eq!(config.ai.timeout_secs, 12);
        assert_eq!(config.session_ttl_secs, 90);
        clear();
    }

    #[test]
    #[serial]
    fn invalid_number_is_a_config_error() {
        clear();
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("AI_TIMEOUT_SECS", "soon");

        assert!(Config::load().is_err());
        clear();
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.ai.retry_backoff_ms, 500);
        assert_eq!(config.ai.rate_limit_cooldown_secs, 30);
        assert!(config.ai.api_key.is_empty());
    }
}

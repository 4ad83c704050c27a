//! Runtime configuration for the webhook engine.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::WebhookError;
use crate::services::delivery_service::DEFAULT_MAX_ATTEMPTS;
use crate::services::sweep_service::{DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_CONCURRENCY};

/// Configuration consumed by [`crate::router::WebhooksState`].
#[derive(Debug, Clone)]
pub struct WebhooksConfig {
    /// Shared bearer secret guarding the sweep trigger endpoint.
    pub sweep_secret: String,
    /// 32-byte AES-256-GCM key for signing secrets at rest.
    pub encryption_key: Vec<u8>,
    pub max_attempts: i32,
    pub sweep_batch_size: i64,
    pub sweep_concurrency: usize,
    /// Allow plain HTTP destinations (development/testing).
    pub allow_http: bool,
}

impl WebhooksConfig {
    #[must_use]
    pub fn new(sweep_secret: impl Into<String>, encryption_key: Vec<u8>) -> Self {
        Self {
            sweep_secret: sweep_secret.into(),
            encryption_key,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
            allow_http: false,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max;
        self
    }

    #[must_use]
    pub fn with_sweep_batch_size(mut self, batch_size: i64) -> Self {
        self.sweep_batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Read configuration from the environment.
    ///
    /// Required: `WEBHOOK_SWEEP_SECRET`, `WEBHOOK_ENCRYPTION_KEY`
    /// (base64, 32 bytes decoded). Optional overrides:
    /// `WEBHOOK_MAX_ATTEMPTS`, `WEBHOOK_SWEEP_BATCH_SIZE`,
    /// `WEBHOOK_ALLOW_HTTP`.
    pub fn from_env() -> Result<Self, WebhookError> {
        let sweep_secret = std::env::var("WEBHOOK_SWEEP_SECRET")
            .map_err(|_| WebhookError::Config("WEBHOOK_SWEEP_SECRET is not set".to_string()))?;

        let key_b64 = std::env::var("WEBHOOK_ENCRYPTION_KEY")
            .map_err(|_| WebhookError::Config("WEBHOOK_ENCRYPTION_KEY is not set".to_string()))?;
        let encryption_key = BASE64.decode(key_b64.trim()).map_err(|e| {
            WebhookError::Config(format!("WEBHOOK_ENCRYPTION_KEY is not valid base64: {e}"))
        })?;
        if encryption_key.len() != 32 {
            return Err(WebhookError::Config(format!(
                "WEBHOOK_ENCRYPTION_KEY must decode to 32 bytes, got {}",
                encryption_key.len()
            )));
        }

        let mut config = Self::new(sweep_secret, encryption_key);

        if let Ok(raw) = std::env::var("WEBHOOK_MAX_ATTEMPTS") {
            match raw.parse() {
                Ok(max) => config.max_attempts = max,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring unparseable WEBHOOK_MAX_ATTEMPTS"
                ),
            }
        }

        if let Ok(raw) = std::env::var("WEBHOOK_SWEEP_BATCH_SIZE") {
            match raw.parse() {
                Ok(size) => config.sweep_batch_size = size,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring unparseable WEBHOOK_SWEEP_BATCH_SIZE"
                ),
            }
        }

        if let Ok(raw) = std::env::var("WEBHOOK_ALLOW_HTTP") {
            config.allow_http = matches!(raw.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WebhooksConfig::new("sweep-secret", vec![0u8; 32]);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.sweep_batch_size, DEFAULT_SWEEP_BATCH_SIZE);
        assert_eq!(config.sweep_concurrency, DEFAULT_SWEEP_CONCURRENCY);
        assert!(!config.allow_http);
    }

    #[test]
    fn test_builders() {
        let config = WebhooksConfig::new("s", vec![0u8; 32])
            .with_max_attempts(3)
            .with_sweep_batch_size(25)
            .with_sweep_concurrency(2)
            .with_allow_http(true);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.sweep_batch_size, 25);
        assert_eq!(config.sweep_concurrency, 2);
        assert!(config.allow_http);
    }

    #[test]
    fn test_from_env_roundtrip() {
        // Single test touching the process environment to avoid races
        // between parallel tests over shared variables.
        std::env::set_var("WEBHOOK_SWEEP_SECRET", "cron-secret");
        std::env::set_var("WEBHOOK_ENCRYPTION_KEY", BASE64.encode([7u8; 32]));
        std::env::set_var("WEBHOOK_MAX_ATTEMPTS", "7");
        std::env::set_var("WEBHOOK_ALLOW_HTTP", "true");

        let config = WebhooksConfig::from_env().unwrap();
        assert_eq!(config.sweep_secret, "cron-secret");
        assert_eq!(config.encryption_key, vec![7u8; 32]);
        assert_eq!(config.max_attempts, 7);
        assert!(config.allow_http);

        std::env::set_var("WEBHOOK_ENCRYPTION_KEY", "too-short");
        assert!(WebhooksConfig::from_env().is_err());

        std::env::remove_var("WEBHOOK_SWEEP_SECRET");
        std::env::remove_var("WEBHOOK_ENCRYPTION_KEY");
        std::env::remove_var("WEBHOOK_MAX_ATTEMPTS");
        std::env::remove_var("WEBHOOK_ALLOW_HTTP");
    }
}

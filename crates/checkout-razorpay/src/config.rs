//! # Razorpay Configuration
//!
//! Configuration management for Razorpay integration.
//! All secrets are loaded from environment variables.

use checkout_core::CheckoutError;
use std::env;

const DEFAULT_API_BASE_URL: &str = "https://api.razorpay.com";

/// Razorpay API configuration
#[derive(Clone)]
pub struct RazorpayConfig {
    /// Public key id (rzp_test_... or rzp_live_...)
    pub key_id: String,

    /// Key secret; also signs client payment proofs
    pub key_secret: String,

    /// Webhook secret set in the Razorpay dashboard
    pub webhook_secret: String,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,
}

impl RazorpayConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `RAZORPAY_KEY_ID`
    /// - `RAZORPAY_KEY_SECRET`
    /// - `RAZORPAY_WEBHOOK_SECRET`
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config = Self::new(
            required("RAZORPAY_KEY_ID")?,
            required("RAZORPAY_KEY_SECRET")?,
            required("RAZORPAY_WEBHOOK_SECRET")?,
        );
        config.validate()?;

        match env::var("RAZORPAY_API_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Ok(config.with_api_base_url(url)),
            _ => Ok(config),
        }
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret: webhook_secret.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Check key formats
    pub fn validate(&self) -> Result<(), CheckoutError> {
        if !self.key_id.starts_with("rzp_test_") && !self.key_id.starts_with("rzp_live_") {
            return Err(CheckoutError::Configuration(
                "RAZORPAY_KEY_ID must start with rzp_test_ or rzp_live_".to_string(),
            ));
        }
        if self.key_secret.is_empty() || self.webhook_secret.is_empty() {
            return Err(CheckoutError::Configuration(
                "Razorpay secrets must not be empty".to_string(),
            ));
        }
        if self.key_secret == self.webhook_secret {
            return Err(CheckoutError::Configuration(
                "RAZORPAY_WEBHOOK_SECRET must differ from RAZORPAY_KEY_SECRET".to_string(),
            ));
        }
        Ok(())
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.key_id.starts_with("rzp_test_")
    }

    /// Check if using live keys
    pub fn is_live_mode(&self) -> bool {
        self.key_id.starts_with("rzp_live_")
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn required(name: &str) -> Result<String, CheckoutError> {
    env::var(name).map_err(|_| CheckoutError::Configuration(format!("{} not set", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = RazorpayConfig::new("rzp_test_abc123", "key_secret", "webhook_secret");
        assert!(config.validate().is_ok());
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());

        let config = RazorpayConfig::new("rzp_live_abc123", "key_secret", "webhook_secret");
        assert!(config.is_live_mode());

        let config = RazorpayConfig::new("pk_test_abc123", "key_secret", "webhook_secret");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_must_be_distinct() {
        let config = RazorpayConfig::new("rzp_test_abc123", "same", "same");
        assert!(matches!(
            config.validate(),
            Err(CheckoutError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = RazorpayConfig::new("rzp_test_abc123", "topsecret", "whsecret");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("rzp_test_abc123"));
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("whsecret"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = RazorpayConfig::new("rzp_test_a", "k", "w")
            .with_api_base_url("http://localhost:9000/");
        assert_eq!(config.api_base_url, "http://localhost:9000");
    }
}

//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOP_API_BASE_URL` - Base URL of the order/payment backend
//!
//! ## Optional
//! - `SHOP_STATE_DIR` - Directory for the cart and tokens (default: .shopsession)
//! - `SHOP_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `SHOP_GATEWAY_BASE_URL` - Payment gateway API (default: <https://api.stripe.com>)
//! - `SHOP_GATEWAY_PUBLISHABLE_KEY` - Gateway publishable key; fetched from the
//!   backend when unset
//! - `SHOP_MAX_CONFIRMATION_ATTEMPTS` - Payment confirmations per checkout (default: 3)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::checkout::DEFAULT_MAX_CONFIRMATION_ATTEMPTS;
use crate::gateway::STRIPE_API_BASE;

const DEFAULT_STATE_DIR: &str = ".shopsession";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
///
/// Implements `Debug` manually to redact the gateway key.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend base URL; endpoint paths are joined onto it
    pub api_base_url: Url,
    /// Directory holding the persisted cart and tokens
    pub state_dir: PathBuf,
    /// Timeout applied to every backend and gateway request
    pub http_timeout: Duration,
    /// Payment gateway API base URL
    pub gateway_base_url: Url,
    /// Gateway publishable key, if configured locally
    pub gateway_publishable_key: Option<SecretString>,
    /// Upper bound on payment confirmations per checkout
    pub max_confirmation_attempts: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("state_dir", &self.state_dir)
            .field("http_timeout", &self.http_timeout)
            .field("gateway_base_url", &self.gateway_base_url.as_str())
            .field(
                "gateway_publishable_key",
                &self.gateway_publishable_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_confirmation_attempts", &self.max_confirmation_attempts)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let api_base_url = parse_url("SHOP_API_BASE_URL", &env.required("SHOP_API_BASE_URL")?)?;
        let state_dir = PathBuf::from(env.or_default("SHOP_STATE_DIR", DEFAULT_STATE_DIR));
        let timeout_secs: u64 = env.parsed_or("SHOP_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SHOP_HTTP_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let gateway_base_url = parse_url(
            "SHOP_GATEWAY_BASE_URL",
            &env.or_default("SHOP_GATEWAY_BASE_URL", STRIPE_API_BASE),
        )?;
        let gateway_publishable_key = env
            .optional("SHOP_GATEWAY_PUBLISHABLE_KEY")
            .map(SecretString::from);
        let max_confirmation_attempts: u32 = env.parsed_or(
            "SHOP_MAX_CONFIRMATION_ATTEMPTS",
            DEFAULT_MAX_CONFIRMATION_ATTEMPTS,
        )?;
        if max_confirmation_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SHOP_MAX_CONFIRMATION_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            api_base_url,
            state_dir,
            http_timeout: Duration::from_secs(timeout_secs),
            gateway_base_url,
            gateway_publishable_key,
            max_confirmation_attempts,
            sentry_dsn: env.optional("SENTRY_DSN"),
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    Ok(url)
}

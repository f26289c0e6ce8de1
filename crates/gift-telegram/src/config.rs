//! # Telegram Configuration
//!
//! Bot credentials and endpoints, loaded from environment variables.
//! A missing bot token is not an error: the server still starts and every
//! provider call reports "not configured".

use gift_core::GiftError;
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Default maximum age of Mini App initData (24 hours)
pub const DEFAULT_INIT_DATA_MAX_AGE_SECS: i64 = 86_400;

/// Telegram Bot API configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token (`<bot id>:<secret>`)
    pub bot_token: Option<String>,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook deliveries
    pub webhook_secret: Option<String>,

    /// initData older than this is refused
    pub init_data_max_age_secs: i64,

    /// Timeout for ordinary Bot API calls
    pub request_timeout: Duration,
}

impl TelegramConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `BOT_TOKEN` (or `TELEGRAM_BOT_TOKEN`)
    /// - `TELEGRAM_API_BASE_URL`
    /// - `TELEGRAM_WEBHOOK_SECRET`
    /// - `INIT_DATA_MAX_AGE_SECS`
    pub fn from_env() -> Result<Self, GiftError> {
        dotenvy::dotenv().ok();

        let bot_token = env::var("BOT_TOKEN")
            .or_else(|_| env::var("TELEGRAM_BOT_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty());

        if let Some(ref token) = bot_token {
            validate_token(token)?;
        }

        let api_base_url = env::var("TELEGRAM_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());

        let webhook_secret = env::var("TELEGRAM_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let init_data_max_age_secs = match env::var("INIT_DATA_MAX_AGE_SECS") {
            Ok(raw) => raw.parse::<i64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                GiftError::Configuration(format!(
                    "INIT_DATA_MAX_AGE_SECS must be a positive integer, got {:?}",
                    raw
                ))
            })?,
            Err(_) => DEFAULT_INIT_DATA_MAX_AGE_SECS,
        };

        Ok(Self {
            bot_token,
            api_base_url,
            webhook_secret,
            init_data_max_age_secs,
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Create config with an explicit token (for testing)
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: Some(bot_token.into()),
            ..Self::unconfigured()
        }
    }

    /// Config with no bot token
    pub fn unconfigured() -> Self {
        Self {
            bot_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            webhook_secret: None,
            init_data_max_age_secs: DEFAULT_INIT_DATA_MAX_AGE_SECS,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }

    /// Full URL of a Bot API method, if a token is present
    pub fn method_url(&self, method: &str) -> Option<String> {
        self.bot_token.as_ref().map(|token| {
            format!(
                "{}/bot{}/{}",
                self.api_base_url.trim_end_matches('/'),
                token,
                method
            )
        })
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Builder: require a webhook secret header
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}

/// Tokens look like `123456789:AAE...`
fn validate_token(token: &str) -> Result<(), GiftError> {
    let valid = match token.split_once(':') {
        Some((id, secret)) => {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty()
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GiftError::Configuration(
            "BOT_TOKEN must look like <bot id>:<secret>".to_string(),
        ))
    }
}

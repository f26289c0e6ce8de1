//! # Stars Provider Trait
//!
//! Outbound calls to the in-chat payment provider.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StarsProvider (trait)                    │
//! │  ├── send_invoice()                                         │
//! │  ├── answer_pre_checkout()                                  │
//! │  ├── send_message()                                         │
//! │  └── answer_callback_query()                                │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┴─────────────────┐
//!  ┌───────┴───────────┐             ┌─────────┴─────────┐
//!  │ TelegramBotClient │             │ RecordingProvider │
//!  │  (gift-telegram)  │             │     (testing)     │
//!  └───────────────────┘             └───────────────────┘
//! ```
//!
//! Every call is a stateless request that reports `ok`/`not ok` through
//! [`ProviderReply`] instead of failing; a server without a credential keeps
//! running and simply gets "not ok" back.

use crate::payload::InvoicePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stars currency code
pub const STARS_CURRENCY: &str = "XTR";

/// Outcome of a provider call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub ok: bool,
    /// Provider's explanation when `ok` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProviderReply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            description: None,
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            ok: false,
            description: Some(description.into()),
        }
    }

    pub fn not_configured() -> Self {
        Self::failed("provider credential is not configured")
    }

    /// Description or a generic fallback
    pub fn reason(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| "provider error".to_string())
    }
}

/// A Stars invoice addressed to a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarsInvoice {
    pub chat_id: i64,
    pub title: String,
    pub description: String,
    pub payload: InvoicePayload,
    /// Amount in Stars
    pub amount: i64,
}

impl StarsInvoice {
    pub fn new(chat_id: i64, title: impl Into<String>, payload: InvoicePayload, amount: i64) -> Self {
        Self {
            chat_id,
            title: title.into(),
            description: "Payment with Telegram Stars".to_string(),
            payload,
            amount,
        }
    }
}

/// Accept/reject answer to a pre-checkout query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCheckoutAnswer {
    Accept,
    Reject { error_message: String },
}

impl PreCheckoutAnswer {
    pub fn is_accept(&self) -> bool {
        matches!(self, PreCheckoutAnswer::Accept)
    }
}

/// One inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardButton {
    pub text: String,
    pub callback_data: String,
}

/// Rows of inline buttons attached to a chat message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<KeyboardButton>>,
}

impl InlineKeyboard {
    pub fn single_row(buttons: Vec<KeyboardButton>) -> Self {
        Self {
            inline_keyboard: vec![buttons],
        }
    }
}

/// Outbound side of the payment provider
#[async_trait]
pub trait StarsProvider: Send + Sync {
    /// Whether a credential is present; without one every call returns "not ok".
    fn is_configured(&self) -> bool;

    /// Create and deliver an invoice into the donor's chat.
    async fn send_invoice(&self, invoice: &StarsInvoice) -> ProviderReply;

    /// Answer a pre-checkout query. Must be called within the provider's
    /// hard deadline.
    async fn answer_pre_checkout(&self, query_id: &str, answer: &PreCheckoutAnswer) -> ProviderReply;

    /// Send a plain chat message, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> ProviderReply;

    /// Acknowledge an inline button press.
    async fn answer_callback_query(&self, callback_query_id: &str) -> ProviderReply;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Shared, dynamically dispatched provider
pub type SharedProvider = Arc<dyn StarsProvider>;

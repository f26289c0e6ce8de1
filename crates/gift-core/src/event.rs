//! # Provider Events
//!
//! Provider-agnostic view of the callbacks delivered to the webhook.
//! `gift-telegram` parses raw Bot API updates into these.

use crate::order::Donor;
use serde::{Deserialize, Serialize};

/// A proposed payment awaiting our accept/reject answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreCheckoutQuery {
    /// Query id to answer
    pub id: String,
    /// Raw invoice payload as echoed by the provider
    pub payload: String,
    /// Proposed amount in Stars
    pub total_amount: i64,
    pub currency: String,
    pub from: Donor,
}

/// A captured payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payload: String,
    /// Provider charge id; the idempotence key for settlement
    pub charge_id: String,
    pub total_amount: i64,
    pub currency: String,
    /// Chat the payment happened in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Donor>,
}

/// An inline keyboard button press
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    pub from: Donor,
}

/// Events the webhook processor understands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    PreCheckout(PreCheckoutQuery),
    PaymentConfirmed(PaymentConfirmation),
    /// `/start` typed in the bot chat
    StartCommand { chat_id: i64 },
    CallbackQuery(CallbackQuery),
    /// Anything else; acknowledged and dropped
    Ignored {
        #[serde(skip_serializing_if = "Option::is_none")]
        update_id: Option<i64>,
    },
}

impl ProviderEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderEvent::PreCheckout(_) => "pre_checkout_query",
            ProviderEvent::PaymentConfirmed(_) => "successful_payment",
            ProviderEvent::StartCommand { .. } => "start_command",
            ProviderEvent::CallbackQuery(_) => "callback_query",
            ProviderEvent::Ignored { .. } => "other",
        }
    }
}

//! # Bot API Updates
//!
//! Raw webhook deliveries and their mapping onto [`ProviderEvent`].
//! Only the fields the payment flow reads are modelled; everything else in
//! the update is ignored by serde.

use gift_core::{CallbackQuery, Donor, PaymentConfirmation, PreCheckoutQuery, ProviderEvent};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<TgCallbackQuery>,
    #[serde(default)]
    pub pre_checkout_query: Option<TgPreCheckoutQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub successful_payment: Option<SuccessfulPayment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl User {
    pub fn donor(&self) -> Donor {
        Donor {
            telegram_id: self.id,
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    pub telegram_payment_charge_id: String,
    #[serde(default)]
    pub provider_payment_charge_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgPreCheckoutQuery {
    pub id: String,
    pub from: User,
    pub currency: String,
    pub total_amount: i64,
    #[serde(default)]
    pub invoice_payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<CallbackMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// The message a callback button was attached to
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMessage {
    pub chat: Chat,
}

impl Update {
    /// Parse a webhook body
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Classify the update.
    ///
    /// Payment updates win over everything else in the same delivery.
    pub fn into_event(self) -> ProviderEvent {
        if let Some(query) = self.pre_checkout_query {
            return ProviderEvent::PreCheckout(PreCheckoutQuery {
                id: query.id,
                payload: query.invoice_payload,
                total_amount: query.total_amount,
                currency: query.currency,
                from: query.from.donor(),
            });
        }

        if let Some(message) = self.message {
            if let Some(payment) = message.successful_payment {
                return ProviderEvent::PaymentConfirmed(PaymentConfirmation {
                    payload: payment.invoice_payload,
                    charge_id: payment.telegram_payment_charge_id,
                    total_amount: payment.total_amount,
                    currency: payment.currency,
                    chat_id: Some(message.chat.id),
                    from: message.from.as_ref().map(User::donor),
                });
            }
            if message.text.as_deref().is_some_and(is_start_command) {
                return ProviderEvent::StartCommand {
                    chat_id: message.chat.id,
                };
            }
            return ProviderEvent::Ignored {
                update_id: self.update_id,
            };
        }

        if let Some(query) = self.callback_query {
            return ProviderEvent::CallbackQuery(CallbackQuery {
                id: query.id,
                data: query.data.unwrap_or_default(),
                chat_id: query.message.map(|m| m.chat.id),
                from: query.from.donor(),
            });
        }

        ProviderEvent::Ignored {
            update_id: self.update_id,
        }
    }
}

/// `/start`, `/start <param>` and `/start@BotName`
fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or("");
    command == "/start" || command.starts_with("/start@")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ProviderEvent {
        Update::from_slice(value.to_string().as_bytes())
            .unwrap()
            .into_event()
    }

    #[test]
    fn test_pre_checkout_query() {
        let event = parse(json!({
            "update_id": 1,
            "pre_checkout_query": {
                "id": "pcq_1",
                "from": { "id": 42, "is_bot": false, "first_name": "Alice", "username": "alice" },
                "currency": "XTR",
                "total_amount": 500,
                "invoice_payload": "order:6f1c2f7e-2a59-4a8e-9a43-0f2f3b3c7d11"
            }
        }));

        match event {
            ProviderEvent::PreCheckout(query) => {
                assert_eq!(query.id, "pcq_1");
                assert_eq!(query.total_amount, 500);
                assert_eq!(query.from.username.as_deref(), Some("alice"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_successful_payment() {
        let event = parse(json!({
            "update_id": 2,
            "message": {
                "message_id": 10,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 42, "first_name": "Alice" },
                "successful_payment": {
                    "currency": "XTR",
                    "total_amount": 500,
                    "invoice_payload": "donate:6f1c2f7e-2a59-4a8e-9a43-0f2f3b3c7d11",
                    "telegram_payment_charge_id": "stxABC",
                    "provider_payment_charge_id": ""
                }
            }
        }));

        match event {
            ProviderEvent::PaymentConfirmed(payment) => {
                assert_eq!(payment.charge_id, "stxABC");
                assert_eq!(payment.chat_id, Some(42));
                assert_eq!(payment.from.map(|d| d.telegram_id), Some(42));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_start_and_callback() {
        let start = parse(json!({
            "update_id": 3,
            "message": { "chat": { "id": 7 }, "text": "/start gift" }
        }));
        assert!(matches!(start, ProviderEvent::StartCommand { chat_id: 7 }));

        let callback = parse(json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb_1",
                "from": { "id": 42 },
                "message": { "chat": { "id": 7 } },
                "data": "stars_100"
            }
        }));
        match callback {
            ProviderEvent::CallbackQuery(query) => {
                assert_eq!(query.data, "stars_100");
                assert_eq!(query.chat_id, Some(7));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_other_updates_are_ignored() {
        let text = parse(json!({
            "update_id": 5,
            "message": { "chat": { "id": 7 }, "text": "/startle" }
        }));
        assert!(matches!(text, ProviderEvent::Ignored { update_id: Some(5) }));

        let edited = parse(json!({ "update_id": 6, "edited_message": {} }));
        assert!(matches!(edited, ProviderEvent::Ignored { update_id: Some(6) }));
    }
}

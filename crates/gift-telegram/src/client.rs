//! # Telegram Bot Client
//!
//! [`StarsProvider`] over the Bot API. Every method is a JSON POST to
//! `{base}/bot{token}/{method}`; the `{ok, description}` envelope is passed
//! back as a [`ProviderReply`] and transport failures become "not ok".

use crate::config::TelegramConfig;
use async_trait::async_trait;
use gift_core::{
    GiftError, GiftResult, InlineKeyboard, PreCheckoutAnswer, ProviderReply, StarsInvoice,
    StarsProvider, PRECHECKOUT_ANSWER_TIMEOUT, STARS_CURRENCY,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

pub struct TelegramBotClient {
    config: TelegramConfig,
    client: Client,
}

impl TelegramBotClient {
    pub fn new(config: TelegramConfig) -> GiftResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GiftError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> GiftResult<Self> {
        Self::new(TelegramConfig::from_env()?)
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> ProviderReply {
        let Some(url) = self.config.method_url(method) else {
            return ProviderReply::not_configured();
        };

        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // Never log the URL: it carries the token
                error!("Bot API {} request failed: {}", method, e.without_url());
                return ProviderReply::failed(format!("network error calling {}", method));
            }
        };

        let status = response.status();
        match response.json::<BotApiResponse>().await {
            Ok(envelope) if envelope.ok => {
                debug!("Bot API {} ok", method);
                ProviderReply::ok()
            }
            Ok(envelope) => {
                error!(
                    "Bot API {} rejected: status={}, description={:?}",
                    method, status, envelope.description
                );
                ProviderReply {
                    ok: false,
                    description: envelope.description,
                }
            }
            Err(e) => {
                error!("Bot API {} returned unreadable body: status={}, {}", method, status, e);
                ProviderReply::failed(format!("HTTP {}", status))
            }
        }
    }
}

#[async_trait]
impl StarsProvider for TelegramBotClient {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[instrument(skip(self, invoice), fields(chat_id = invoice.chat_id))]
    async fn send_invoice(&self, invoice: &StarsInvoice) -> ProviderReply {
        let body = SendInvoice {
            chat_id: invoice.chat_id,
            title: &invoice.title,
            description: &invoice.description,
            payload: invoice.payload.encode(),
            provider_token: "",
            currency: STARS_CURRENCY,
            prices: [LabeledPrice {
                label: "Stars",
                amount: invoice.amount,
            }],
        };
        self.call("sendInvoice", &body, None).await
    }

    async fn answer_pre_checkout(&self, query_id: &str, answer: &PreCheckoutAnswer) -> ProviderReply {
        let body = match answer {
            PreCheckoutAnswer::Accept => AnswerPreCheckout {
                pre_checkout_query_id: query_id,
                ok: true,
                error_message: None,
            },
            PreCheckoutAnswer::Reject { error_message } => AnswerPreCheckout {
                pre_checkout_query_id: query_id,
                ok: false,
                error_message: Some(error_message),
            },
        };
        self.call(
            "answerPreCheckoutQuery",
            &body,
            Some(PRECHECKOUT_ANSWER_TIMEOUT),
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> ProviderReply {
        let body = SendMessage {
            chat_id,
            text,
            reply_markup: keyboard,
        };
        self.call("sendMessage", &body, None).await
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> ProviderReply {
        let body = AnswerCallbackQuery { callback_query_id };
        self.call("answerCallbackQuery", &body, None).await
    }

    fn provider_name(&self) -> &'static str {
        "telegram"
    }
}

// =============================================================================
// Bot API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct SendInvoice<'a> {
    chat_id: i64,
    title: &'a str,
    description: &'a str,
    payload: String,
    /// Empty for Stars
    provider_token: &'a str,
    currency: &'a str,
    prices: [LabeledPrice<'a>; 1],
}

#[derive(Debug, Serialize)]
struct LabeledPrice<'a> {
    label: &'a str,
    amount: i64,
}

#[derive(Debug, Serialize)]
struct AnswerPreCheckout<'a> {
    pre_checkout_query_id: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gift_core::{InvoicePayload, KeyboardButton};
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order_payload() -> InvoicePayload {
        "order:6f1c2f7e-2a59-4a8e-9a43-0f2f3b3c7d11".parse().unwrap()
    }

    const TOKEN: &str = "123:abc";

    fn client(server: &MockServer) -> TelegramBotClient {
        TelegramBotClient::new(TelegramConfig::new(TOKEN).with_api_base_url(server.uri())).unwrap()
    }

    fn ok_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true }))
    }

    #[tokio::test]
    async fn test_send_invoice_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendInvoice"))
            .and(body_json(json!({
                "chat_id": 42,
                "title": "Headphones",
                "description": "Payment with Telegram Stars",
                "payload": "order:6f1c2f7e-2a59-4a8e-9a43-0f2f3b3c7d11",
                "provider_token": "",
                "currency": "XTR",
                "prices": [{ "label": "Stars", "amount": 500 }]
            })))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        let invoice = StarsInvoice::new(42, "Headphones", order_payload(), 500);
        let reply = client(&server).send_invoice(&invoice).await;

        assert!(reply.ok);
    }

    #[tokio::test]
    async fn test_rejection_description_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendInvoice"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let invoice = StarsInvoice::new(42, "Stars", InvoicePayload::new_donation(), 50);
        let reply = client(&server).send_invoice(&invoice).await;

        assert!(!reply.ok);
        assert_eq!(reply.reason(), "Bad Request: chat not found");
    }

    #[tokio::test]
    async fn test_answer_pre_checkout_reject() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/answerPreCheckoutQuery"))
            .and(body_json(json!({
                "pre_checkout_query_id": "pcq_1",
                "ok": false,
                "error_message": "Amount does not match"
            })))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server)
            .answer_pre_checkout(
                "pcq_1",
                &PreCheckoutAnswer::Reject {
                    error_message: "Amount does not match".into(),
                },
            )
            .await;

        assert!(reply.ok);
    }

    #[tokio::test]
    async fn test_answer_pre_checkout_accept_omits_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/answerPreCheckoutQuery"))
            .and(body_json(json!({ "pre_checkout_query_id": "pcq_1", "ok": true })))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server)
            .answer_pre_checkout("pcq_1", &PreCheckoutAnswer::Accept)
            .await;
        assert!(reply.ok);
    }

    #[tokio::test]
    async fn test_send_message_with_keyboard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 42,
                "reply_markup": { "inline_keyboard": [[{ "text": "⭐ 50", "callback_data": "stars_50" }]] }
            })))
            .respond_with(ok_response())
            .expect(1)
            .mount(&server)
            .await;

        let keyboard = InlineKeyboard::single_row(vec![KeyboardButton {
            text: "⭐ 50".into(),
            callback_data: "stars_50".into(),
        }]);
        let reply = client(&server)
            .send_message(42, "Choose an amount:", Some(&keyboard))
            .await;
        assert!(reply.ok);
    }

    #[tokio::test]
    async fn test_unconfigured_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok_response())
            .expect(0)
            .mount(&server)
            .await;

        let client = TelegramBotClient::new(
            TelegramConfig::unconfigured().with_api_base_url(server.uri()),
        )
        .unwrap();

        assert!(!client.is_configured());
        let reply = client.answer_callback_query("cb_1").await;
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn test_unreadable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let reply = client(&server).answer_callback_query("cb_1").await;

        assert!(!reply.ok);
        assert_eq!(reply.reason(), "HTTP 502 Bad Gateway");
    }
}

//! Test doubles shared by the workspace test suites.

use crate::provider::{
    InlineKeyboard, PreCheckoutAnswer, ProviderReply, StarsInvoice, StarsProvider,
};
use async_trait::async_trait;
use std::sync::Mutex;

/// One outbound call captured by [`RecordingProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Invoice(StarsInvoice),
    PreCheckout {
        query_id: String,
        answer: PreCheckoutAnswer,
    },
    Message {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    CallbackAnswer(String),
}

/// A [`StarsProvider`] that records calls instead of talking to a network
pub struct RecordingProvider {
    configured: bool,
    invoice_rejection: Option<String>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            configured: true,
            invoice_rejection: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Behaves like a server with no bot token
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Builder: every `send_invoice` fails with `reason`
    pub fn rejecting_invoices(mut self, reason: impl Into<String>) -> Self {
        self.invoice_rejection = Some(reason.into());
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn invoices(&self) -> Vec<StarsInvoice> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Invoice(invoice) => Some(invoice),
                _ => None,
            })
            .collect()
    }

    pub fn pre_checkout_answers(&self) -> Vec<(String, PreCheckoutAnswer)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::PreCheckout { query_id, answer } => Some((query_id, answer)),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<(i64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Message { chat_id, text, .. } => Some((chat_id, text)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ProviderCall) -> ProviderReply {
        self.calls.lock().unwrap().push(call);
        if self.configured {
            ProviderReply::ok()
        } else {
            ProviderReply::not_configured()
        }
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StarsProvider for RecordingProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send_invoice(&self, invoice: &StarsInvoice) -> ProviderReply {
        let reply = self.record(ProviderCall::Invoice(invoice.clone()));
        match &self.invoice_rejection {
            Some(reason) => ProviderReply::failed(reason.clone()),
            None => reply,
        }
    }

    async fn answer_pre_checkout(&self, query_id: &str, answer: &PreCheckoutAnswer) -> ProviderReply {
        self.record(ProviderCall::PreCheckout {
            query_id: query_id.to_string(),
            answer: answer.clone(),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> ProviderReply {
        self.record(ProviderCall::Message {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        })
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> ProviderReply {
        self.record(ProviderCall::CallbackAnswer(callback_query_id.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

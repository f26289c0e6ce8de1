//! # Invoice Issuer
//!
//! Turns a reserved order into a Stars invoice in the donor's chat.

use crate::error::{GiftError, GiftResult};
use crate::provider::{SharedProvider, StarsInvoice};
use crate::store::SharedStore;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

const DEFAULT_TITLE: &str = "Gift";

/// Input to [`InvoiceIssuer::issue_invoice`]
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub item_id: i64,
    pub order_id: Uuid,
    pub amount_xtr: i64,
    pub title: Option<String>,
}

/// Invoice was accepted by the provider
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceConfirmation {
    pub order_id: Uuid,
    pub amount_xtr: i64,
}

pub struct InvoiceIssuer {
    store: SharedStore,
    provider: SharedProvider,
}

impl InvoiceIssuer {
    pub fn new(store: SharedStore, provider: SharedProvider) -> Self {
        Self { store, provider }
    }

    /// Send the invoice for an existing order.
    ///
    /// The payload is derived from the order id, so re-issuing is safe.
    /// Order state is never touched, whatever the provider answers.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn issue_invoice(&self, request: InvoiceRequest) -> GiftResult<InvoiceConfirmation> {
        let order = self
            .store
            .order(request.order_id)
            .await?
            .ok_or(GiftError::OrderNotFound {
                order_id: request.order_id,
            })?;

        if !self.provider.is_configured() {
            return Err(GiftError::ProviderNotConfigured);
        }

        if order.item_id != request.item_id {
            return Err(GiftError::Validation(format!(
                "order {} does not belong to item {}",
                order.id, request.item_id
            )));
        }
        if order.amount_xtr != request.amount_xtr {
            return Err(GiftError::Validation(format!(
                "amount_xtr {} does not match the reserved amount {}",
                request.amount_xtr, order.amount_xtr
            )));
        }

        let title = request
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let invoice = StarsInvoice::new(
            order.donor.telegram_id,
            title,
            order.invoice_payload(),
            order.amount_xtr,
        );

        let reply = self.provider.send_invoice(&invoice).await;
        if !reply.ok {
            error!("Invoice rejected for order {}: {}", order.id, reply.reason());
            return Err(GiftError::InvoiceRejected {
                reason: reply.reason(),
            });
        }

        info!(
            "Sent invoice: order={}, chat={}, amount={} XTR",
            order.id, invoice.chat_id, invoice.amount
        );

        Ok(InvoiceConfirmation {
            order_id: order.id,
            amount_xtr: order.amount_xtr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{DisplayCurrency, Item};
    use crate::order::{Donor, OrderStatus};
    use crate::reservation::{ReservationManager, ReservationRequest};
    use crate::store::{GiftStore, MemoryStore};
    use crate::testing::{ProviderCall, RecordingProvider};
    use std::sync::Arc;

    async fn reserved(store: Arc<MemoryStore>) -> Uuid {
        ReservationManager::new(store)
            .create_reservation(ReservationRequest {
                item_id: 7,
                model_id: 1,
                donor: Some(Donor::new(42)),
                amount_xtr: 500,
                message: None,
            })
            .await
            .unwrap()
            .order_id
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_items([Item::new(
            7,
            1,
            "Headphones",
            110.0,
            DisplayCurrency::USD,
        )]))
    }

    fn request(order_id: Uuid) -> InvoiceRequest {
        InvoiceRequest {
            item_id: 7,
            order_id,
            amount_xtr: 500,
            title: Some("Headphones".into()),
        }
    }

    #[tokio::test]
    async fn test_issue_invoice_to_donor_chat() {
        let store = store();
        let order_id = reserved(store.clone()).await;
        let provider = Arc::new(RecordingProvider::new());
        let issuer = InvoiceIssuer::new(store, provider.clone());

        let confirmation = issuer.issue_invoice(request(order_id)).await.unwrap();

        assert_eq!(confirmation.amount_xtr, 500);
        let invoices = provider.invoices();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].chat_id, 42);
        assert_eq!(invoices[0].payload.encode(), format!("order:{}", order_id));
        assert_eq!(invoices[0].title, "Headphones");
    }

    #[tokio::test]
    async fn test_reissue_uses_same_payload() {
        let store = store();
        let order_id = reserved(store.clone()).await;
        let provider = Arc::new(RecordingProvider::new());
        let issuer = InvoiceIssuer::new(store, provider.clone());

        issuer.issue_invoice(request(order_id)).await.unwrap();
        issuer.issue_invoice(request(order_id)).await.unwrap();

        let invoices = provider.invoices();
        assert_eq!(invoices[0].payload, invoices[1].payload);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let provider = Arc::new(RecordingProvider::new());
        let issuer = InvoiceIssuer::new(store(), provider.clone());

        let err = issuer.issue_invoice(request(Uuid::new_v4())).await.unwrap_err();

        assert!(matches!(err, GiftError::OrderNotFound { .. }));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_not_configured() {
        let store = store();
        let order_id = reserved(store.clone()).await;
        let issuer = InvoiceIssuer::new(store, Arc::new(RecordingProvider::unconfigured()));

        let err = issuer.issue_invoice(request(order_id)).await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_rejection_leaves_order_untouched() {
        let store = store();
        let order_id = reserved(store.clone()).await;
        let provider = Arc::new(RecordingProvider::new().rejecting_invoices("Bad Request: chat not found"));
        let issuer = InvoiceIssuer::new(store.clone(), provider.clone());

        let err = issuer.issue_invoice(request(order_id)).await.unwrap_err();

        match err {
            GiftError::InvoiceRejected { reason } => assert!(reason.contains("chat not found")),
            other => panic!("unexpected error: {}", other),
        }
        let order = store.order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Reserved);
        assert!(matches!(provider.calls()[0], ProviderCall::Invoice(_)));
    }

    #[tokio::test]
    async fn test_amount_must_match_reservation() {
        let store = store();
        let order_id = reserved(store.clone()).await;
        let issuer = InvoiceIssuer::new(store, Arc::new(RecordingProvider::new()));
        let mut req = request(order_id);
        req.amount_xtr = 1;

        let err = issuer.issue_invoice(req).await.unwrap_err();
        assert!(matches!(err, GiftError::Validation(_)));
    }
}

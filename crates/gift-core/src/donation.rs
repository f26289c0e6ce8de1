//! # Donation Channel
//!
//! Unattached Stars payments. A donation has no item and no reservation;
//! it shares invoicing and settlement with wishlist orders.

use crate::error::{GiftError, GiftResult};
use crate::order::{Donation, Donor};
use crate::provider::{SharedProvider, StarsInvoice};
use crate::store::SharedStore;
use serde::Serialize;
use tracing::{error, info, instrument};

const DONATION_TITLE: &str = "Stars";

/// Pending donation handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct DonationTicket {
    /// Wire form of the donation payload
    pub payload: String,
    pub amount: i64,
    /// Always true: payment lands later through the webhook
    pub confirmation_pending: bool,
}

pub struct DonationChannel {
    store: SharedStore,
    provider: SharedProvider,
}

impl DonationChannel {
    pub fn new(store: SharedStore, provider: SharedProvider) -> Self {
        Self { store, provider }
    }

    /// Create a donation invoiced straight into the donor's private chat.
    ///
    /// `donor` must come from a verified identity, never from request fields.
    pub async fn create_donation(&self, donor: Donor, amount: i64) -> GiftResult<DonationTicket> {
        let chat_id = donor.telegram_id;
        self.create_in_chat(chat_id, donor, amount).await
    }

    /// Create a donation and send its invoice to `chat_id`.
    #[instrument(skip(self, donor), fields(donor = donor.telegram_id))]
    pub async fn create_in_chat(
        &self,
        chat_id: i64,
        donor: Donor,
        amount: i64,
    ) -> GiftResult<DonationTicket> {
        if amount < 1 {
            return Err(GiftError::Validation(
                "amount must be at least 1 Star".to_string(),
            ));
        }
        if !self.provider.is_configured() {
            return Err(GiftError::ProviderNotConfigured);
        }

        let donation = Donation::pending(donor, amount);
        let payload = donation.payload();
        self.store.insert_donation(donation).await?;

        let invoice = StarsInvoice::new(chat_id, DONATION_TITLE, payload, amount);
        let reply = self.provider.send_invoice(&invoice).await;
        if !reply.ok {
            error!("Donation invoice rejected: {}", reply.reason());
            return Err(GiftError::InvoiceRejected {
                reason: reply.reason(),
            });
        }

        info!("Sent donation invoice: chat={}, amount={} XTR", chat_id, amount);

        Ok(DonationTicket {
            payload: payload.encode(),
            amount,
            confirmation_pending: true,
        })
    }
}

//! # Reservation Manager
//!
//! Creates orders, enforces a single live reservation per item and expires
//! reservations that were never paid.

use crate::error::{GiftError, GiftResult};
use crate::order::{Donor, Order, RESERVATION_MINUTES};
use crate::payload::InvoicePayload;
use crate::store::{ReserveOutcome, SharedStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input to [`ReservationManager::create_reservation`]
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub item_id: i64,
    pub model_id: i64,
    /// Resolved donor; `None` when neither a session nor the body named one
    pub donor: Option<Donor>,
    pub amount_xtr: i64,
    pub message: Option<String>,
}

/// A successful reservation
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub order_id: Uuid,
    /// Wire form of the invoice correlation token
    pub invoice_payload: String,
    pub reserved_until: DateTime<Utc>,
}

pub struct ReservationManager {
    store: SharedStore,
    window: Duration,
}

impl ReservationManager {
    /// Create a manager with the default ten-minute window
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            window: Duration::minutes(RESERVATION_MINUTES),
        }
    }

    /// Builder: override the reservation window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reserve an item for a donor.
    ///
    /// The live-reservation check, the order insert and the item lock are a
    /// single store operation, so concurrent callers on the same item get
    /// exactly one success and a conflict carrying the winner's expiry.
    #[instrument(skip(self, request), fields(item_id = request.item_id, model_id = request.model_id))]
    pub async fn create_reservation(&self, request: ReservationRequest) -> GiftResult<Reservation> {
        if request.item_id <= 0 || request.model_id <= 0 {
            return Err(GiftError::Validation(
                "item_id and model_id must be positive".to_string(),
            ));
        }
        if request.amount_xtr < 1 {
            return Err(GiftError::Validation(
                "amount_xtr must be at least 1".to_string(),
            ));
        }
        let donor = request.donor.ok_or(GiftError::MissingDonorIdentity)?;

        if let Some(item) = self.store.item(request.item_id).await? {
            if item.model_id != request.model_id {
                return Err(GiftError::ItemNotFound {
                    item_id: request.item_id,
                });
            }
        }

        let now = Utc::now();
        let mut order = Order::reserve(
            request.item_id,
            request.model_id,
            donor,
            request.amount_xtr,
            now,
            self.window,
        );
        order.message = request.message.filter(|m| !m.trim().is_empty());

        match self.store.reserve_item(order, now).await? {
            ReserveOutcome::Reserved(order) => {
                info!(
                    "Reserved item {} for donor {}: order={}, until={}",
                    order.item_id, order.donor.telegram_id, order.id, order.reserved_until
                );
                Ok(Reservation {
                    order_id: order.id,
                    invoice_payload: order.invoice_payload().encode(),
                    reserved_until: order.reserved_until,
                })
            }
            ReserveOutcome::Conflict { reserved_until } => Err(GiftError::ItemAlreadyReserved {
                item_id: request.item_id,
                reserved_until,
            }),
            ReserveOutcome::Unavailable => Err(GiftError::ItemUnavailable {
                item_id: request.item_id,
            }),
            ReserveOutcome::ItemMissing => Err(GiftError::ItemNotFound {
                item_id: request.item_id,
            }),
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> GiftResult<Order> {
        self.store
            .order(order_id)
            .await?
            .ok_or(GiftError::OrderNotFound { order_id })
    }

    /// Look up an order by its invoice payload. Read-only.
    ///
    /// Donation payloads, unknown schemes and malformed ids all yield `None`.
    pub async fn find_order_by_invoice_token(&self, token: &str) -> GiftResult<Option<Order>> {
        match token.parse::<InvoicePayload>() {
            Ok(InvoicePayload::Order(id)) => self.store.order(id).await,
            _ => Ok(None),
        }
    }

    /// Expire reservations whose window has passed and release their items.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> GiftResult<Vec<Order>> {
        let expired = self.store.expire_stale(now).await?;
        for order in &expired {
            warn!(
                "Reservation expired without payment: order={}, item={}",
                order.id, order.item_id
            );
        }
        Ok(expired)
    }
}

//! # gift-core
//!
//! Core types, traits and payment protocol for the wishlist gift engine.
//!
//! This crate provides:
//! - `Item` and Stars pricing for the public wishlist
//! - `ReservationManager` for time-boxed, single-holder reservations
//! - `InvoiceIssuer` and `DonationChannel` for sending Stars invoices
//! - `WebhookProcessor` for pre-checkout validation and idempotent settlement
//! - `GiftStore` and `StarsProvider` traits at the storage and provider seams
//! - `GiftError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use gift_core::{ReservationManager, ReservationRequest, InvoiceIssuer, InvoiceRequest};
//!
//! // Reserve an item for the donor
//! let reservation = reservations.create_reservation(request).await?;
//!
//! // Send the Stars invoice into the donor's chat
//! issuer.issue_invoice(InvoiceRequest {
//!     item_id: 7,
//!     order_id: reservation.order_id,
//!     amount_xtr: 500,
//!     title: None,
//! }).await?;
//!
//! // Provider callbacks land in the webhook processor
//! processor.handle(event).await;
//! ```

pub mod donation;
pub mod error;
pub mod event;
pub mod invoice;
pub mod item;
pub mod order;
pub mod payload;
pub mod provider;
pub mod reservation;
pub mod settlement;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use donation::{DonationChannel, DonationTicket};
pub use error::{GiftError, GiftResult};
pub use event::{CallbackQuery, PaymentConfirmation, PreCheckoutQuery, ProviderEvent};
pub use invoice::{InvoiceConfirmation, InvoiceIssuer, InvoiceRequest};
pub use item::{DisplayCurrency, Item, ItemStatus, StarCost, WishlistSeed};
pub use order::{Donation, DonationStatus, Donor, Order, OrderStatus};
pub use payload::{InvoicePayload, PayloadError, PayloadKind};
pub use provider::{
    InlineKeyboard, KeyboardButton, PreCheckoutAnswer, ProviderReply, SharedProvider,
    StarsInvoice, StarsProvider, STARS_CURRENCY,
};
pub use reservation::{Reservation, ReservationManager, ReservationRequest};
pub use settlement::{
    EventOutcome, PreCheckoutDecision, RejectReason, SettlementConfig, SettlementOutcome,
    WebhookProcessor, PRECHECKOUT_ANSWER_TIMEOUT,
};
pub use store::{GiftStore, MemoryStore, ReserveOutcome, SettleOutcome, SharedStore};

//! # Order and Donation Types
//!
//! Records created by the reservation and donation flows and settled by
//! provider callbacks.

use crate::payload::InvoicePayload;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default reservation window
pub const RESERVATION_MINUTES: i64 = 10;

/// The paying Telegram user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    /// External (Telegram) user id
    pub telegram_id: i64,

    /// Display name, without the leading `@`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Donor {
    pub fn new(telegram_id: i64) -> Self {
        Self {
            telegram_id,
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Human-readable label for operator notifications
    pub fn label(&self) -> String {
        match &self.username {
            Some(name) => format!("@{}", name),
            None => format!("user {}", self.telegram_id),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Item locked, awaiting payment
    #[default]
    Reserved,
    /// Payment captured
    Paid,
    /// Reservation lapsed without payment
    Expired,
    /// Withdrawn by an operator
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Reserved => "reserved",
            OrderStatus::Paid => "paid",
            OrderStatus::Expired => "expired",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(OrderStatus::Reserved),
            "paid" => Some(OrderStatus::Paid),
            "expired" => Some(OrderStatus::Expired),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// A donor's claim on a wishlist item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub item_id: i64,
    pub model_id: i64,
    pub donor: Donor,

    /// Amount in Stars (XTR)
    pub amount_xtr: i64,

    pub status: OrderStatus,
    pub reserved_at: DateTime<Utc>,
    pub reserved_until: DateTime<Utc>,

    /// Optional note from the donor to the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Provider charge id; set exactly when the order is paid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a reserved order starting at `now`
    pub fn reserve(
        item_id: i64,
        model_id: i64,
        donor: Donor,
        amount_xtr: i64,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            model_id,
            donor,
            amount_xtr,
            status: OrderStatus::Reserved,
            reserved_at: now,
            reserved_until: now + window,
            message: None,
            charge_id: None,
            paid_at: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Invoice correlation token, a pure function of the order id
    pub fn invoice_payload(&self) -> InvoicePayload {
        InvoicePayload::Order(self.id)
    }

    /// Reserved and not yet past its window
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Reserved && self.reserved_until > now
    }

    /// Reserved but past its window
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Reserved && self.reserved_until <= now
    }

    pub fn is_settled(&self) -> bool {
        self.charge_id.is_some()
    }

    /// Stamp settlement. Callers must check `is_settled` first.
    pub(crate) fn mark_paid(&mut self, charge_id: &str, paid_at: DateTime<Utc>) {
        self.status = OrderStatus::Paid;
        self.charge_id = Some(charge_id.to_string());
        self.paid_at = Some(paid_at);
    }
}

/// Donation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    #[default]
    Pending,
    Paid,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DonationStatus::Pending),
            "paid" => Some(DonationStatus::Paid),
            _ => None,
        }
    }
}

/// An unattached Stars payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: Uuid,
    pub amount_xtr: i64,
    pub donor: Donor,
    pub status: DonationStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Donation {
    /// Create a pending donation with a fresh payload
    pub fn pending(donor: Donor, amount_xtr: i64) -> Self {
        Self {
            id: InvoicePayload::new_donation().id(),
            amount_xtr,
            donor,
            status: DonationStatus::Pending,
            charge_id: None,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    pub fn payload(&self) -> InvoicePayload {
        InvoicePayload::Donation(self.id)
    }

    pub fn is_settled(&self) -> bool {
        self.charge_id.is_some()
    }

    pub(crate) fn mark_paid(&mut self, charge_id: &str, paid_at: DateTime<Utc>) {
        self.status = DonationStatus::Paid;
        self.charge_id = Some(charge_id.to_string());
        self.paid_at = Some(paid_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Duration {
        Duration::minutes(RESERVATION_MINUTES)
    }

    #[test]
    fn test_reserve_sets_window() {
        let now = Utc::now();
        let order = Order::reserve(7, 1, Donor::new(42), 500, now, window());

        assert_eq!(order.status, OrderStatus::Reserved);
        assert_eq!(order.reserved_until - order.reserved_at, Duration::minutes(10));
        assert!(order.is_live(now));
        assert!(!order.is_settled());
    }

    #[test]
    fn test_live_and_stale() {
        let now = Utc::now();
        let order = Order::reserve(7, 1, Donor::new(42), 500, now, window());
        let later = now + Duration::minutes(11);

        assert!(!order.is_live(later));
        assert!(order.is_stale(later));
    }

    #[test]
    fn test_invoice_payload_matches_id() {
        let order = Order::reserve(7, 1, Donor::new(42), 500, Utc::now(), window());
        assert_eq!(order.invoice_payload(), InvoicePayload::Order(order.id));
    }

    #[test]
    fn test_mark_paid_sets_charge() {
        let mut order = Order::reserve(7, 1, Donor::new(42), 500, Utc::now(), window());
        order.mark_paid("charge_1", Utc::now());

        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.is_settled());
        assert!(!order.is_stale(Utc::now() + Duration::hours(1)));
    }

    #[test]
    fn test_donor_label() {
        assert_eq!(Donor::new(1).with_username("alice").label(), "@alice");
        assert_eq!(Donor::new(1).label(), "user 1");
    }

    #[test]
    fn test_status_strings() {
        for status in [
            OrderStatus::Reserved,
            OrderStatus::Paid,
            OrderStatus::Expired,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DonationStatus::parse("refunded"), None);
    }
}

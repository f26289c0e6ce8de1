//! # Gift Store
//!
//! Persistence seam for items, orders and donations.
//!
//! Every method is one atomic unit: the item row and the order row change
//! together or not at all. [`MemoryStore`] gets that from a single lock;
//! `gift-postgres` from a transaction with row locks.

use crate::error::GiftResult;
use crate::item::{Item, ItemStatus};
use crate::order::{Donation, Order, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of an atomic check-and-reserve
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// Order inserted and item locked
    Reserved(Order),
    /// A live reservation already holds the item
    Conflict { reserved_until: DateTime<Utc> },
    /// Item is gifted
    Unavailable,
    /// Item missing or soft-deleted
    ItemMissing,
}

/// Result of a compare-and-set settlement
#[derive(Debug, Clone)]
pub enum SettleOutcome<T> {
    /// This call stamped the charge id
    Settled {
        record: T,
        /// For orders: whether the item moved to `gifted`
        item_gifted: bool,
    },
    /// A charge id was already present; nothing changed
    AlreadySettled(T),
    /// Record is in a state that can never be paid
    Refused(T),
    NotFound,
}

#[async_trait]
pub trait GiftStore: Send + Sync {
    /// Backend name (for logging and health)
    fn backend_name(&self) -> &'static str;

    async fn item(&self, item_id: i64) -> GiftResult<Option<Item>>;

    /// Active items of a model, newest first
    async fn items_for_model(&self, model_id: i64) -> GiftResult<Vec<Item>>;

    /// Insert or replace an item (seeding and tests)
    async fn upsert_item(&self, item: Item) -> GiftResult<()>;

    /// Check for a live reservation, insert `order`, lock the item.
    ///
    /// A lapsed reservation on the same item is expired in the same unit.
    async fn reserve_item(&self, order: Order, now: DateTime<Utc>) -> GiftResult<ReserveOutcome>;

    async fn order(&self, order_id: Uuid) -> GiftResult<Option<Order>>;

    /// Mark an order paid and its item gifted, at most once per order.
    ///
    /// `reserved` and `expired` orders are settleable; an expired order's
    /// item is only gifted when no other live order holds it.
    async fn settle_order(
        &self,
        order_id: Uuid,
        charge_id: &str,
        paid_at: DateTime<Utc>,
    ) -> GiftResult<SettleOutcome<Order>>;

    async fn insert_donation(&self, donation: Donation) -> GiftResult<()>;

    async fn donation(&self, donation_id: Uuid) -> GiftResult<Option<Donation>>;

    /// Mark a donation paid, at most once.
    async fn settle_donation(
        &self,
        donation_id: Uuid,
        charge_id: &str,
        paid_at: DateTime<Utc>,
    ) -> GiftResult<SettleOutcome<Donation>>;

    /// Expire reservations past their window and release their items.
    /// Returns the orders that were expired.
    async fn expire_stale(&self, now: DateTime<Utc>) -> GiftResult<Vec<Order>>;
}

/// Shared, dynamically dispatched store
pub type SharedStore = Arc<dyn GiftStore>;

#[derive(Default)]
struct Tables {
    items: HashMap<i64, Item>,
    orders: HashMap<Uuid, Order>,
    donations: HashMap<Uuid, Donation>,
}

impl Tables {
    fn live_order_for_item(&self, item_id: i64, now: DateTime<Utc>) -> Option<&Order> {
        self.orders
            .values()
            .find(|o| o.item_id == item_id && o.is_live(now))
    }

    fn item_held_by_other(&self, item_id: i64, order_id: Uuid) -> bool {
        self.orders
            .values()
            .any(|o| o.item_id == item_id && o.id != order_id && o.status == OrderStatus::Reserved)
    }

    fn set_item_status(&mut self, item_id: i64, status: ItemStatus) {
        if let Some(item) = self.items.get_mut(&item_id) {
            item.status = status;
        }
    }
}

/// In-process store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with items
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let tables = Tables {
            items: items.into_iter().map(|item| (item.id, item)).collect(),
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }
}

#[async_trait]
impl GiftStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn item(&self, item_id: i64) -> GiftResult<Option<Item>> {
        Ok(self.tables.lock().await.items.get(&item_id).cloned())
    }

    async fn items_for_model(&self, model_id: i64) -> GiftResult<Vec<Item>> {
        let tables = self.tables.lock().await;
        let mut items: Vec<Item> = tables
            .items
            .values()
            .filter(|item| item.model_id == model_id && item.active)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn upsert_item(&self, item: Item) -> GiftResult<()> {
        self.tables.lock().await.items.insert(item.id, item);
        Ok(())
    }

    async fn reserve_item(&self, order: Order, now: DateTime<Utc>) -> GiftResult<ReserveOutcome> {
        let mut tables = self.tables.lock().await;

        match tables.items.get(&order.item_id) {
            Some(item) if item.active => {
                if item.status == ItemStatus::Gifted {
                    return Ok(ReserveOutcome::Unavailable);
                }
            }
            _ => return Ok(ReserveOutcome::ItemMissing),
        }

        if let Some(live) = tables.live_order_for_item(order.item_id, now) {
            return Ok(ReserveOutcome::Conflict {
                reserved_until: live.reserved_until,
            });
        }

        for stale in tables
            .orders
            .values_mut()
            .filter(|o| o.item_id == order.item_id && o.is_stale(now))
        {
            stale.status = OrderStatus::Expired;
        }

        tables.set_item_status(order.item_id, ItemStatus::Reserved);
        tables.orders.insert(order.id, order.clone());

        Ok(ReserveOutcome::Reserved(order))
    }

    async fn order(&self, order_id: Uuid) -> GiftResult<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(&order_id).cloned())
    }

    async fn settle_order(
        &self,
        order_id: Uuid,
        charge_id: &str,
        paid_at: DateTime<Utc>,
    ) -> GiftResult<SettleOutcome<Order>> {
        let mut tables = self.tables.lock().await;

        let Some(order) = tables.orders.get(&order_id).cloned() else {
            return Ok(SettleOutcome::NotFound);
        };
        if order.is_settled() {
            return Ok(SettleOutcome::AlreadySettled(order));
        }
        if order.status == OrderStatus::Cancelled {
            return Ok(SettleOutcome::Refused(order));
        }

        let item_gifted = order.status == OrderStatus::Reserved
            || !tables.item_held_by_other(order.item_id, order.id);

        let mut paid = order;
        paid.mark_paid(charge_id, paid_at);
        tables.orders.insert(paid.id, paid.clone());
        if item_gifted {
            tables.set_item_status(paid.item_id, ItemStatus::Gifted);
        }

        Ok(SettleOutcome::Settled {
            record: paid,
            item_gifted,
        })
    }

    async fn insert_donation(&self, donation: Donation) -> GiftResult<()> {
        self.tables
            .lock()
            .await
            .donations
            .insert(donation.id, donation);
        Ok(())
    }

    async fn donation(&self, donation_id: Uuid) -> GiftResult<Option<Donation>> {
        Ok(self.tables.lock().await.donations.get(&donation_id).cloned())
    }

    async fn settle_donation(
        &self,
        donation_id: Uuid,
        charge_id: &str,
        paid_at: DateTime<Utc>,
    ) -> GiftResult<SettleOutcome<Donation>> {
        let mut tables = self.tables.lock().await;

        let Some(donation) = tables.donations.get_mut(&donation_id) else {
            return Ok(SettleOutcome::NotFound);
        };
        if donation.is_settled() {
            return Ok(SettleOutcome::AlreadySettled(donation.clone()));
        }

        donation.mark_paid(charge_id, paid_at);
        Ok(SettleOutcome::Settled {
            record: donation.clone(),
            item_gifted: false,
        })
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> GiftResult<Vec<Order>> {
        let mut tables = self.tables.lock().await;

        let stale_ids: Vec<Uuid> = tables
            .orders
            .values()
            .filter(|o| o.is_stale(now))
            .map(|o| o.id)
            .collect();

        let mut expired = Vec::with_capacity(stale_ids.len());
        for id in stale_ids {
            let Some(order) = tables.orders.get_mut(&id) else {
                continue;
            };
            order.status = OrderStatus::Expired;
            let order = order.clone();

            let still_held = tables.item_held_by_other(order.item_id, order.id);
            let reserved = tables
                .items
                .get(&order.item_id)
                .map(|item| item.status == ItemStatus::Reserved)
                .unwrap_or(false);
            if reserved && !still_held {
                tables.set_item_status(order.item_id, ItemStatus::Available);
            }
            expired.push(order);
        }

        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DisplayCurrency;
    use crate::order::{Donor, RESERVATION_MINUTES};
    use chrono::Duration;

    fn store() -> MemoryStore {
        MemoryStore::with_items([Item::new(7, 1, "Headphones", 110.0, DisplayCurrency::USD)])
    }

    fn order_at(now: DateTime<Utc>) -> Order {
        Order::reserve(7, 1, Donor::new(42), 500, now, Duration::minutes(RESERVATION_MINUTES))
    }

    #[tokio::test]
    async fn test_reserve_locks_item() {
        let store = store();
        let now = Utc::now();

        let outcome = store.reserve_item(order_at(now), now).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));
        assert_eq!(store.item(7).await.unwrap().unwrap().status, ItemStatus::Reserved);
    }

    #[tokio::test]
    async fn test_second_reserve_conflicts() {
        let store = store();
        let now = Utc::now();
        let first = order_at(now);
        let until = first.reserved_until;

        store.reserve_item(first, now).await.unwrap();
        let outcome = store.reserve_item(order_at(now), now).await.unwrap();

        match outcome {
            ReserveOutcome::Conflict { reserved_until } => assert_eq!(reserved_until, until),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_reservation_is_overwritten() {
        let store = store();
        let then = Utc::now() - Duration::minutes(30);
        let old = order_at(then);
        let old_id = old.id;
        store.reserve_item(old, then).await.unwrap();

        let now = Utc::now();
        let outcome = store.reserve_item(order_at(now), now).await.unwrap();

        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));
        let old = store.order(old_id).await.unwrap().unwrap();
        assert_eq!(old.status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn test_missing_and_gifted_items() {
        let store = store();
        let now = Utc::now();

        let mut missing = order_at(now);
        missing.item_id = 99;
        assert!(matches!(
            store.reserve_item(missing, now).await.unwrap(),
            ReserveOutcome::ItemMissing
        ));

        let mut gifted = Item::new(8, 1, "Book", 10.0, DisplayCurrency::USD);
        gifted.status = ItemStatus::Gifted;
        store.upsert_item(gifted).await.unwrap();
        let mut order = order_at(now);
        order.item_id = 8;
        assert!(matches!(
            store.reserve_item(order, now).await.unwrap(),
            ReserveOutcome::Unavailable
        ));
    }

    #[tokio::test]
    async fn test_settle_order_once() {
        let store = store();
        let now = Utc::now();
        let order = order_at(now);
        let id = order.id;
        store.reserve_item(order, now).await.unwrap();

        let first = store.settle_order(id, "charge_1", now).await.unwrap();
        assert!(matches!(first, SettleOutcome::Settled { item_gifted: true, .. }));

        let second = store.settle_order(id, "charge_2", now).await.unwrap();
        match second {
            SettleOutcome::AlreadySettled(order) => {
                assert_eq!(order.charge_id.as_deref(), Some("charge_1"))
            }
            other => panic!("expected already settled, got {:?}", other),
        }
        assert_eq!(store.item(7).await.unwrap().unwrap().status, ItemStatus::Gifted);
    }

    #[tokio::test]
    async fn test_settle_unknown_order() {
        let store = store();
        let outcome = store
            .settle_order(Uuid::new_v4(), "charge_1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, SettleOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_expire_releases_item() {
        let store = store();
        let then = Utc::now() - Duration::minutes(30);
        store.reserve_item(order_at(then), then).await.unwrap();

        let expired = store.expire_stale(Utc::now()).await.unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, OrderStatus::Expired);
        assert_eq!(store.item(7).await.unwrap().unwrap().status, ItemStatus::Available);
    }

    #[tokio::test]
    async fn test_late_capture_after_expiry() {
        let store = store();
        let then = Utc::now() - Duration::minutes(30);
        let order = order_at(then);
        let id = order.id;
        store.reserve_item(order, then).await.unwrap();
        store.expire_stale(Utc::now()).await.unwrap();

        let outcome = store.settle_order(id, "charge_1", Utc::now()).await.unwrap();

        assert!(matches!(outcome, SettleOutcome::Settled { item_gifted: true, .. }));
        assert_eq!(store.item(7).await.unwrap().unwrap().status, ItemStatus::Gifted);
    }

    #[tokio::test]
    async fn test_late_capture_does_not_steal_item() {
        let store = store();
        let then = Utc::now() - Duration::minutes(30);
        let late = order_at(then);
        let late_id = late.id;
        store.reserve_item(late, then).await.unwrap();

        let now = Utc::now();
        store.reserve_item(order_at(now), now).await.unwrap();

        let outcome = store.settle_order(late_id, "charge_1", now).await.unwrap();
        assert!(matches!(outcome, SettleOutcome::Settled { item_gifted: false, .. }));
        assert_eq!(store.item(7).await.unwrap().unwrap().status, ItemStatus::Reserved);
    }

    #[tokio::test]
    async fn test_donation_settles_once() {
        let store = store();
        let donation = Donation::pending(Donor::new(42), 100);
        let id = donation.id;
        store.insert_donation(donation).await.unwrap();

        let first = store.settle_donation(id, "charge_1", Utc::now()).await.unwrap();
        assert!(matches!(first, SettleOutcome::Settled { .. }));
        let second = store.settle_donation(id, "charge_1", Utc::now()).await.unwrap();
        assert!(matches!(second, SettleOutcome::AlreadySettled(_)));
    }

    #[tokio::test]
    async fn test_items_for_model_filters_inactive() {
        let store = store();
        let mut hidden = Item::new(8, 1, "Old", 5.0, DisplayCurrency::USD);
        hidden.active = false;
        store.upsert_item(hidden).await.unwrap();
        store
            .upsert_item(Item::new(9, 2, "Other model", 5.0, DisplayCurrency::USD))
            .await
            .unwrap();

        let items = store.items_for_model(1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 7);
    }
}

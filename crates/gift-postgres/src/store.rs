//! # PostgreSQL Gift Store
//!
//! Every [`GiftStore`] method runs in one transaction. Lock order is always
//! item row first, then order rows, so reservation, settlement and expiry
//! cannot deadlock each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gift_core::{
    DisplayCurrency, Donation, DonationStatus, Donor, GiftError, GiftResult, GiftStore, Item,
    ItemStatus, Order, OrderStatus, ReserveOutcome, SettleOutcome, StarCost,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../schema.sql");

const ITEM_COLUMNS: &str = "id, model_id, name, description, url, price, currency, \
     base_stars, fee_stars, total_stars, photos, item_status, is_active, created_at";

const ORDER_COLUMNS: &str = "id, item_id, model_id, donor_telegram_id, donor_username, \
     amount_xtr, status, reserved_at, reserved_until, gift_message, \
     telegram_payment_charge_id, paid_at";

const DONATION_COLUMNS: &str = "id, amount_xtr, donor_telegram_id, donor_username, status, \
     telegram_payment_charge_id, created_at, paid_at";

fn storage(err: sqlx::Error) -> GiftError {
    GiftError::Storage(err.to_string())
}

pub struct PgGiftStore {
    pool: PgPool,
}

impl PgGiftStore {
    /// Connect a pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> GiftResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if missing
    pub async fn migrate(&self) -> GiftResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        info!("Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl GiftStore for PgGiftStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn item(&self, item_id: i64) -> GiftResult<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM wishlist_items WHERE id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(ItemRow::into_item).transpose()
    }

    async fn items_for_model(&self, model_id: i64) -> GiftResult<Vec<Item>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM wishlist_items \
             WHERE model_id = $1 AND is_active \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    async fn upsert_item(&self, item: Item) -> GiftResult<()> {
        sqlx::query(
            "INSERT INTO wishlist_items \
                 (id, model_id, name, description, url, price, currency, base_stars, \
                  fee_stars, total_stars, photos, item_status, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO UPDATE SET \
                 model_id = EXCLUDED.model_id, name = EXCLUDED.name, \
                 description = EXCLUDED.description, url = EXCLUDED.url, \
                 price = EXCLUDED.price, currency = EXCLUDED.currency, \
                 base_stars = EXCLUDED.base_stars, fee_stars = EXCLUDED.fee_stars, \
                 total_stars = EXCLUDED.total_stars, photos = EXCLUDED.photos, \
                 item_status = EXCLUDED.item_status, is_active = EXCLUDED.is_active, \
                 updated_at = NOW()",
        )
        .bind(item.id)
        .bind(item.model_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.url)
        .bind(item.price)
        .bind(item.currency.as_str())
        .bind(item.stars.base)
        .bind(item.stars.fee)
        .bind(item.stars.total)
        .bind(&item.photos)
        .bind(item.status.as_str())
        .bind(item.active)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    #[instrument(skip(self, order), fields(item_id = order.item_id))]
    async fn reserve_item(&self, order: Order, now: DateTime<Utc>) -> GiftResult<ReserveOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let item: Option<(String, bool)> = sqlx::query_as(
            "SELECT item_status, is_active FROM wishlist_items WHERE id = $1 FOR UPDATE",
        )
        .bind(order.item_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        match item {
            Some((status, true)) => {
                if status == ItemStatus::Gifted.as_str() {
                    return Ok(ReserveOutcome::Unavailable);
                }
            }
            _ => return Ok(ReserveOutcome::ItemMissing),
        }

        let live: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT reserved_until FROM orders \
             WHERE item_id = $1 AND status = 'reserved' AND reserved_until > $2 \
             ORDER BY reserved_until DESC LIMIT 1",
        )
        .bind(order.item_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        if let Some((reserved_until,)) = live {
            return Ok(ReserveOutcome::Conflict { reserved_until });
        }

        let expired = sqlx::query(
            "UPDATE orders SET status = 'expired' \
             WHERE item_id = $1 AND status = 'reserved' AND reserved_until <= $2",
        )
        .bind(order.item_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        if expired.rows_affected() > 0 {
            debug!("Expired {} stale reservation(s)", expired.rows_affected());
        }

        sqlx::query(
            "INSERT INTO orders \
                 (id, item_id, model_id, donor_telegram_id, donor_username, amount_xtr, \
                  status, reserved_at, reserved_until, telegram_invoice_payload, gift_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(order.id)
        .bind(order.item_id)
        .bind(order.model_id)
        .bind(order.donor.telegram_id)
        .bind(&order.donor.username)
        .bind(order.amount_xtr)
        .bind(order.status.as_str())
        .bind(order.reserved_at)
        .bind(order.reserved_until)
        .bind(order.invoice_payload().encode())
        .bind(&order.message)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query(
            "UPDATE wishlist_items SET item_status = 'reserved', updated_at = NOW() WHERE id = $1",
        )
        .bind(order.item_id)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(ReserveOutcome::Reserved(order))
    }

    async fn order(&self, order_id: Uuid) -> GiftResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        row.map(OrderRow::into_order).transpose()
    }

    #[instrument(skip(self, charge_id))]
    async fn settle_order(
        &self,
        order_id: Uuid,
        charge_id: &str,
        paid_at: DateTime<Utc>,
    ) -> GiftResult<SettleOutcome<Order>> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let item_id: Option<(i64,)> = sqlx::query_as("SELECT item_id FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let Some((item_id,)) = item_id else {
            return Ok(SettleOutcome::NotFound);
        };

        sqlx::query("SELECT id FROM wishlist_items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        let row: OrderRow = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;
        let order = row.into_order()?;

        if order.is_settled() {
            return Ok(SettleOutcome::AlreadySettled(order));
        }
        if order.status == OrderStatus::Cancelled {
            return Ok(SettleOutcome::Refused(order));
        }

        let item_gifted = if order.status == OrderStatus::Reserved {
            true
        } else {
            let (held,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM orders \
                 WHERE item_id = $1 AND id <> $2 AND status = 'reserved')",
            )
            .bind(order.item_id)
            .bind(order.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
            !held
        };

        let paid: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET status = 'paid', telegram_payment_charge_id = $2, paid_at = $3 \
             WHERE id = $1 AND telegram_payment_charge_id IS NULL \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id)
        .bind(charge_id)
        .bind(paid_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;
        let Some(paid) = paid else {
            return Ok(SettleOutcome::AlreadySettled(order));
        };

        if item_gifted {
            sqlx::query(
                "UPDATE wishlist_items SET item_status = 'gifted', updated_at = NOW() WHERE id = $1",
            )
            .bind(order.item_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;

        Ok(SettleOutcome::Settled {
            record: paid.into_order()?,
            item_gifted,
        })
    }

    async fn insert_donation(&self, donation: Donation) -> GiftResult<()> {
        sqlx::query(
            "INSERT INTO donations \
                 (id, payload, amount_xtr, donor_telegram_id, donor_username, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(donation.id)
        .bind(donation.payload().encode())
        .bind(donation.amount_xtr)
        .bind(donation.donor.telegram_id)
        .bind(&donation.donor.username)
        .bind(donation.status.as_str())
        .bind(donation.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn donation(&self, donation_id: Uuid) -> GiftResult<Option<Donation>> {
        let row: Option<DonationRow> = sqlx::query_as(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE id = $1"
        ))
        .bind(donation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(DonationRow::into_donation).transpose()
    }

    #[instrument(skip(self, charge_id))]
    async fn settle_donation(
        &self,
        donation_id: Uuid,
        charge_id: &str,
        paid_at: DateTime<Utc>,
    ) -> GiftResult<SettleOutcome<Donation>> {
        let paid: Option<DonationRow> = sqlx::query_as(&format!(
            "UPDATE donations SET status = 'paid', telegram_payment_charge_id = $2, paid_at = $3 \
             WHERE id = $1 AND telegram_payment_charge_id IS NULL \
             RETURNING {DONATION_COLUMNS}"
        ))
        .bind(donation_id)
        .bind(charge_id)
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        if let Some(row) = paid {
            return Ok(SettleOutcome::Settled {
                record: row.into_donation()?,
                item_gifted: false,
            });
        }

        Ok(match self.donation(donation_id).await? {
            Some(donation) => SettleOutcome::AlreadySettled(donation),
            None => SettleOutcome::NotFound,
        })
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> GiftResult<Vec<Order>> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Lock the affected items before touching their orders
        let item_ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM wishlist_items WHERE id IN \
                 (SELECT item_id FROM orders WHERE status = 'reserved' AND reserved_until <= $1) \
             ORDER BY id FOR UPDATE",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET status = 'expired' \
             WHERE status = 'reserved' AND reserved_until <= $1 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;

        let ids: Vec<i64> = item_ids.into_iter().map(|(id,)| id).collect();
        sqlx::query(
            "UPDATE wishlist_items SET item_status = 'available', updated_at = NOW() \
             WHERE id = ANY($1) AND item_status = 'reserved' \
               AND NOT EXISTS (SELECT 1 FROM orders o \
                               WHERE o.item_id = wishlist_items.id AND o.status = 'reserved')",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    model_id: i64,
    name: String,
    description: Option<String>,
    url: Option<String>,
    price: f64,
    currency: String,
    base_stars: i64,
    fee_stars: i64,
    total_stars: i64,
    photos: Vec<String>,
    item_status: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> GiftResult<Item> {
        let status = ItemStatus::parse(&self.item_status).ok_or_else(|| {
            GiftError::Storage(format!(
                "item {} has unknown status {:?}",
                self.id, self.item_status
            ))
        })?;

        Ok(Item {
            id: self.id,
            model_id: self.model_id,
            name: self.name,
            description: self.description.unwrap_or_default(),
            url: self.url,
            price: self.price,
            currency: DisplayCurrency::from_code(&self.currency),
            stars: StarCost {
                base: self.base_stars,
                fee: self.fee_stars,
                total: self.total_stars,
            },
            photos: self.photos,
            status,
            active: self.is_active,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    item_id: i64,
    model_id: i64,
    donor_telegram_id: i64,
    donor_username: Option<String>,
    amount_xtr: i64,
    status: String,
    reserved_at: DateTime<Utc>,
    reserved_until: DateTime<Utc>,
    gift_message: Option<String>,
    telegram_payment_charge_id: Option<String>,
    paid_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self) -> GiftResult<Order> {
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            GiftError::Storage(format!(
                "order {} has unknown status {:?}",
                self.id, self.status
            ))
        })?;

        Ok(Order {
            id: self.id,
            item_id: self.item_id,
            model_id: self.model_id,
            donor: Donor {
                telegram_id: self.donor_telegram_id,
                username: self.donor_username,
            },
            amount_xtr: self.amount_xtr,
            status,
            reserved_at: self.reserved_at,
            reserved_until: self.reserved_until,
            message: self.gift_message,
            charge_id: self.telegram_payment_charge_id,
            paid_at: self.paid_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DonationRow {
    id: Uuid,
    amount_xtr: i64,
    donor_telegram_id: i64,
    donor_username: Option<String>,
    status: String,
    telegram_payment_charge_id: Option<String>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl DonationRow {
    fn into_donation(self) -> GiftResult<Donation> {
        let status = DonationStatus::parse(&self.status).ok_or_else(|| {
            GiftError::Storage(format!(
                "donation {} has unknown status {:?}",
                self.id, self.status
            ))
        })?;

        Ok(Donation {
            id: self.id,
            amount_xtr: self.amount_xtr,
            donor: Donor {
                telegram_id: self.donor_telegram_id,
                username: self.donor_username,
            },
            status,
            charge_id: self.telegram_payment_charge_id,
            created_at: self.created_at,
            paid_at: self.paid_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_row(status: &str) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: Uuid::new_v4(),
            item_id: 7,
            model_id: 1,
            donor_telegram_id: 42,
            donor_username: Some("alice".into()),
            amount_xtr: 500,
            status: status.into(),
            reserved_at: now,
            reserved_until: now + chrono::Duration::minutes(10),
            gift_message: None,
            telegram_payment_charge_id: None,
            paid_at: None,
        }
    }

    #[test]
    fn test_order_row_conversion() {
        let order = order_row("reserved").into_order().unwrap();
        assert_eq!(order.status, OrderStatus::Reserved);
        assert_eq!(order.donor.label(), "@alice");
        assert!(!order.is_settled());
    }

    #[test]
    fn test_unknown_status_is_storage_error() {
        let err = order_row("refunded").into_order().unwrap_err();
        assert!(matches!(err, GiftError::Storage(_)));
    }

    #[test]
    fn test_item_row_conversion() {
        let row = ItemRow {
            id: 7,
            model_id: 1,
            name: "Headphones".into(),
            description: None,
            url: Some("https://shop.example/headphones".into()),
            price: 110.0,
            currency: "eur".into(),
            base_stars: 4600,
            fee_stars: 460,
            total_stars: 5060,
            photos: vec!["a.jpg".into()],
            item_status: "gifted".into(),
            is_active: true,
            created_at: Utc::now(),
        };

        let item = row.into_item().unwrap();
        assert_eq!(item.currency, DisplayCurrency::EUR);
        assert_eq!(item.status, ItemStatus::Gifted);
        assert_eq!(item.description, "");
        assert!(!item.is_purchasable());
    }

    #[test]
    fn test_schema_declares_reservation_guard() {
        assert!(SCHEMA.contains("orders_one_reservation_per_item"));
        assert!(SCHEMA.contains("telegram_payment_charge_id  TEXT UNIQUE"));
    }
}

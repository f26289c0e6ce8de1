//! Runs against a real database when `TEST_DATABASE_URL` is set; each test
//! is a no-op otherwise.

use chrono::{Duration, Utc};
use gift_core::{
    DisplayCurrency, Donation, Donor, GiftStore, Item, ItemStatus, Order, OrderStatus,
    ReserveOutcome, SettleOutcome,
};
use gift_postgres::PgGiftStore;
use std::sync::Arc;

async fn store() -> Option<PgGiftStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let store = PgGiftStore::connect(&url, 8).await.unwrap();
    store.migrate().await.unwrap();
    Some(store)
}

/// Fresh item with an id unlikely to collide between runs
async fn fresh_item(store: &PgGiftStore) -> i64 {
    let id = 1_000_000 + (Utc::now().timestamp_nanos_opt().unwrap_or(0) % 1_000_000_000).abs();
    store
        .upsert_item(Item::new(id, 1, "Headphones", 110.0, DisplayCurrency::USD))
        .await
        .unwrap();
    id
}

fn order(item_id: i64, donor: i64) -> Order {
    Order::reserve(item_id, 1, Donor::new(donor), 500, Utc::now(), Duration::minutes(10))
}

#[tokio::test]
async fn test_reserve_then_settle() {
    let Some(store) = store().await else { return };
    let item_id = fresh_item(&store).await;

    let ReserveOutcome::Reserved(reserved) = store
        .reserve_item(order(item_id, 42), Utc::now())
        .await
        .unwrap()
    else {
        panic!("expected reservation");
    };

    let conflict = store.reserve_item(order(item_id, 43), Utc::now()).await.unwrap();
    assert!(matches!(conflict, ReserveOutcome::Conflict { .. }));

    let charge = format!("charge-{}", reserved.id);
    let first = store.settle_order(reserved.id, &charge, Utc::now()).await.unwrap();
    assert!(matches!(first, SettleOutcome::Settled { item_gifted: true, .. }));
    let second = store.settle_order(reserved.id, &charge, Utc::now()).await.unwrap();
    assert!(matches!(second, SettleOutcome::AlreadySettled(_)));

    let order = store.order(reserved.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    let item = store.item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Gifted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_single_winner() {
    let Some(store) = store().await else { return };
    let store = Arc::new(store);
    let item_id = fresh_item(&store).await;

    let attempts: Vec<_> = (0..10)
        .map(|donor| {
            let store = store.clone();
            tokio::spawn(async move { store.reserve_item(order(item_id, donor), Utc::now()).await })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        if let ReserveOutcome::Reserved(_) = attempt.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_expire_releases_item() {
    let Some(store) = store().await else { return };
    let item_id = fresh_item(&store).await;
    let then = Utc::now() - Duration::minutes(30);
    let stale = Order::reserve(item_id, 1, Donor::new(42), 500, then, Duration::minutes(10));
    store.reserve_item(stale.clone(), then).await.unwrap();

    let expired = store.expire_stale(Utc::now()).await.unwrap();

    assert!(expired.iter().any(|o| o.id == stale.id));
    let item = store.item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Available);
}

#[tokio::test]
async fn test_donation_settles_once() {
    let Some(store) = store().await else { return };
    let donation = Donation::pending(Donor::new(42), 100);
    let id = donation.id;
    store.insert_donation(donation).await.unwrap();

    let charge = format!("charge-{}", id);
    let first = store.settle_donation(id, &charge, Utc::now()).await.unwrap();
    assert!(matches!(first, SettleOutcome::Settled { .. }));
    let second = store.settle_donation(id, &charge, Utc::now()).await.unwrap();
    assert!(matches!(second, SettleOutcome::AlreadySettled(_)));
}

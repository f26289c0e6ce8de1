//! Background expiry of lapsed reservations.

use chrono::Utc;
use gift_core::ReservationManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Periodically expire reservations whose window has passed so their items
/// show as available again without waiting for the next reservation attempt.
pub fn spawn_expiry_sweeper(
    reservations: Arc<ReservationManager>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match reservations.expire_stale(Utc::now()).await {
                Ok(expired) if !expired.is_empty() => {
                    debug!("Expiry sweep released {} reservations", expired.len());
                }
                Ok(_) => {}
                Err(e) => error!("Expiry sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use gift_core::{
        DisplayCurrency, Donor, GiftStore, Item, ItemStatus, MemoryStore, Order, OrderStatus,
    };

    #[tokio::test]
    async fn test_sweeper_expires_lapsed_reservation() {
        let store = Arc::new(MemoryStore::with_items([Item::new(
            7,
            1,
            "Headphones",
            110.0,
            DisplayCurrency::USD,
        )]));
        let then = Utc::now() - ChronoDuration::minutes(30);
        let stale = Order::reserve(7, 1, Donor::new(42), 500, then, ChronoDuration::minutes(10));
        store.reserve_item(stale.clone(), then).await.unwrap();

        let reservations = Arc::new(ReservationManager::new(store.clone()));
        let handle = spawn_expiry_sweeper(reservations, Duration::from_millis(10));

        // The first tick fires immediately
        let mut released = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.item(7).await.unwrap().unwrap().status == ItemStatus::Available {
                released = true;
                break;
            }
        }
        handle.abort();

        assert!(released);
        let order = store.order(stale.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Expired);
    }
}

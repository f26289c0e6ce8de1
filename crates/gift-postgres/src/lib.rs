//! # gift-postgres
//!
//! PostgreSQL implementation of `GiftStore` for wishlist-gift-rs.
//!
//! ```rust,ignore
//! use gift_postgres::PgGiftStore;
//!
//! let store = PgGiftStore::connect(&database_url, 10).await?;
//! store.migrate().await?;
//! ```

pub mod store;

pub use store::PgGiftStore;

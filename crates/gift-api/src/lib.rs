//! # gift-api
//!
//! HTTP API layer for wishlist-gift-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for reservations, invoices and donations
//! - The Telegram webhook that drives pre-checkout and settlement
//! - A background sweeper that expires lapsed reservations
//! - Tracked webhook tasks drained on shutdown
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/orders` | Reserve an item |
//! | GET | `/api/orders/{order_id}` | Get order |
//! | POST | `/api/payments/invoice` | Send the Stars invoice |
//! | POST | `/api/payments/telegram-webhook` | Telegram updates |
//! | POST | `/api/stars/send` | Unattached donation |
//! | GET | `/api/wishlist/model/{model_id}` | Public wishlist |

pub mod handlers;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod tasks;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
pub use sweeper::spawn_expiry_sweeper;
pub use tasks::WebhookTasks;

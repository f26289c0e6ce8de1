//! # gift-telegram
//!
//! Telegram Bot API adapter for wishlist-gift-rs.
//!
//! - **TelegramBotClient** - `StarsProvider` over the Bot API
//!   (`sendInvoice`, `answerPreCheckoutQuery`, `sendMessage`, `answerCallbackQuery`)
//! - **Update** - webhook deliveries mapped onto `ProviderEvent`
//! - **verify_init_data** - Mini App session verification
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gift_telegram::{TelegramBotClient, TelegramConfig, Update};
//!
//! let client = TelegramBotClient::new(TelegramConfig::from_env()?)?;
//!
//! // In the webhook endpoint:
//! let event = Update::from_slice(&body)?.into_event();
//! processor.handle(event).await;
//! ```

pub mod client;
pub mod config;
pub mod init_data;
pub mod update;

// Re-exports
pub use client::TelegramBotClient;
pub use config::TelegramConfig;
pub use init_data::{verify_init_data, InitDataError, WebAppUser};
pub use update::Update;

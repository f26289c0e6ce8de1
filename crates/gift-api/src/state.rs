//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the store and the Stars provider into the protocol components.

use chrono::Duration as ChronoDuration;
use gift_core::{
    DonationChannel, GiftError, GiftResult, GiftStore, InvoiceIssuer, MemoryStore,
    ReservationManager, SettlementConfig, SharedProvider, SharedStore, WebhookProcessor,
    WishlistSeed,
};
use gift_postgres::PgGiftStore;
use gift_telegram::{TelegramBotClient, TelegramConfig};
use crate::tasks::WebhookTasks;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// PostgreSQL URL; `None` runs on the in-memory store
    pub database_url: Option<String>,
    /// Operator chat for donation notices
    pub admin_chat_id: Option<i64>,
    pub reservation_minutes: i64,
    pub precheckout_deadline_ms: u64,
    /// Expiry sweep period; 0 disables the sweeper
    pub reservation_sweep_secs: u64,
    /// TOML seed for the in-memory store
    pub wishlist_seed: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> GiftResult<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("PORT", 3000)?,
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
            admin_chat_id: env_parse_opt("ADMIN_CHAT_ID")?,
            reservation_minutes: env_parse("RESERVATION_MINUTES", 10)?,
            precheckout_deadline_ms: env_parse("PRECHECKOUT_DEADLINE_MS", 8000)?,
            reservation_sweep_secs: env_parse("RESERVATION_SWEEP_SECS", 60)?,
            wishlist_seed: std::env::var("WISHLIST_SEED")
                .unwrap_or_else(|_| "config/wishlist.toml".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GiftResult<()> {
        if self.reservation_minutes < 1 {
            return Err(GiftError::Configuration(
                "RESERVATION_MINUTES must be at least 1".to_string(),
            ));
        }
        self.settlement_config().validate()
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> GiftResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GiftError::Configuration(format!("Invalid socket address: {}", e)))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn reservation_window(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.reservation_minutes)
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        let config = SettlementConfig::default()
            .with_precheckout_deadline(Duration::from_millis(self.precheckout_deadline_ms));
        match self.admin_chat_id {
            Some(chat_id) => config.with_admin_chat(chat_id),
            None => config,
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.reservation_sweep_secs > 0).then(|| Duration::from_secs(self.reservation_sweep_secs))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            environment: "development".to_string(),
            database_url: None,
            admin_chat_id: None,
            reservation_minutes: 10,
            precheckout_deadline_ms: 8000,
            reservation_sweep_secs: 60,
            wishlist_seed: "config/wishlist.toml".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> GiftResult<T> {
    match env_parse_opt(name)? {
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn env_parse_opt<T: FromStr>(name: &str) -> GiftResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|_| {
            GiftError::Configuration(format!("{} has an invalid value: {:?}", name, raw))
        }),
        _ => Ok(None),
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Bot credentials (initData verification, webhook secret)
    pub telegram: TelegramConfig,
    pub store: SharedStore,
    pub provider: SharedProvider,
    pub reservations: Arc<ReservationManager>,
    pub invoices: Arc<InvoiceIssuer>,
    pub donations: Arc<DonationChannel>,
    pub webhook: Arc<WebhookProcessor>,
    /// Webhook work still running after its 200
    pub tasks: WebhookTasks,
}

impl AppState {
    /// Build state from the environment: PostgreSQL when `DATABASE_URL` is
    /// set, a seeded in-memory store otherwise.
    pub async fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let telegram = TelegramConfig::from_env()?;

        let store: SharedStore = match &config.database_url {
            Some(url) => {
                let store = PgGiftStore::connect(url, 10).await?;
                store.migrate().await?;
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set, using the in-memory store");
                let store = MemoryStore::new();
                load_wishlist_seed(&store, &config.wishlist_seed).await?;
                Arc::new(store)
            }
        };

        if !telegram.is_configured() {
            warn!("BOT_TOKEN not set: invoices and donations will answer 503");
        }
        let provider: SharedProvider = Arc::new(TelegramBotClient::new(telegram.clone())?);

        Ok(Self::from_parts(config, telegram, store, provider))
    }

    /// Assemble state from already-built parts
    pub fn from_parts(
        config: AppConfig,
        telegram: TelegramConfig,
        store: SharedStore,
        provider: SharedProvider,
    ) -> Self {
        let reservations =
            ReservationManager::new(store.clone()).with_window(config.reservation_window());
        let invoices = InvoiceIssuer::new(store.clone(), provider.clone());
        let donations = DonationChannel::new(store.clone(), provider.clone());
        let webhook =
            WebhookProcessor::new(store.clone(), provider.clone(), config.settlement_config());

        Self {
            config,
            telegram,
            store,
            provider,
            reservations: Arc::new(reservations),
            invoices: Arc::new(invoices),
            donations: Arc::new(donations),
            webhook: Arc::new(webhook),
            tasks: WebhookTasks::new(),
        }
    }
}

/// Load seed items into the in-memory store
async fn load_wishlist_seed(store: &MemoryStore, path: &str) -> anyhow::Result<()> {
    let candidates = [path.to_string(), format!("../{}", path), format!("../../{}", path)];

    for candidate in &candidates {
        if let Ok(content) = std::fs::read_to_string(candidate) {
            let seed = WishlistSeed::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", candidate, e))?;
            let items = seed.into_items();
            let count = items.len();
            for item in items {
                store.upsert_item(item).await?;
            }
            info!("Loaded {} wishlist items from {}", count, candidate);
            return Ok(());
        }
    }

    warn!("No wishlist seed found at {}, starting empty", path);
    Ok(())
}

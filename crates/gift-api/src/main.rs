//! # Wishlist Gift
//!
//! Telegram Stars payments for wishlist gifts.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export BOT_TOKEN=123456:ABC...
//! export DATABASE_URL=postgres://localhost/wishlist
//! export TELEGRAM_WEBHOOK_SECRET=...
//!
//! # Run the server
//! wishlist-gift
//! ```

use gift_api::{routes, spawn_expiry_sweeper, state::AppState};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Print banner
    print_banner();

    // Initialize application state
    let state = AppState::new().await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Store: {}", state.store.backend_name());
    info!("Bot token configured: {}", state.provider.is_configured());

    let sweeper = state
        .config
        .sweep_interval()
        .map(|period| spawn_expiry_sweeper(state.reservations.clone(), period));

    let webhook_tasks = state.tasks.clone();

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("🎁 Wishlist Gift starting on http://{}", addr);

    if !is_prod {
        info!("📝 Health: http://{}/health", addr);
        info!("🛒 Reserve: POST http://{}/api/orders", addr);
        info!("🔔 Webhook: POST http://{}/api/payments/telegram-webhook", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    // Acknowledged updates are not redelivered; finish them before exiting
    webhook_tasks.drain(WEBHOOK_DRAIN_LIMIT).await;
    info!("Shutdown complete");

    Ok(())
}

/// Longest wait for in-flight webhook work at shutdown
const WEBHOOK_DRAIN_LIMIT: Duration = Duration::from_secs(30);

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_banner() {
    println!(
        r#"
  🎁 Wishlist Gift RS ⭐
  ━━━━━━━━━━━━━━━━━━━━━━━
  Telegram Stars wishlist payments
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}

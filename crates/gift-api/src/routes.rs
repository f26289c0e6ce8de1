//! # Routes
//!
//! Axum router configuration for the wishlist gift API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Orders:
///   - POST /api/orders - Reserve an item and create its order
///   - GET  /api/orders/{order_id} - Get order
///
/// - Payments:
///   - POST /api/payments/invoice - Send the Stars invoice for an order
///   - POST /api/payments/telegram-webhook - Telegram Bot API updates
///
/// - Donations:
///   - POST /api/stars/send - Unattached Stars donation from the Mini App
///
/// - Wishlist:
///   - GET /api/wishlist/model/{model_id} - Public wishlist of a model
pub fn create_router(state: AppState) -> Router {
    // The Mini App is served from Telegram's origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let payment_routes = Router::new()
        .route("/invoice", post(handlers::create_invoice))
        .route("/telegram-webhook", post(handlers::telegram_webhook));

    let api_routes = Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/orders/{order_id}", get(handlers::get_order))
        .nest("/payments", payment_routes)
        .route("/stars/send", post(handlers::send_stars))
        .route("/wishlist/model/{model_id}", get(handlers::model_wishlist));

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api", api_routes)
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

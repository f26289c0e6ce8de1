//! # Request Handlers
//!
//! Axum request handlers for the wishlist gift API.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use gift_core::{
    DonationTicket, Donor, GiftError, InvoiceConfirmation, InvoiceRequest, Item, Order,
    Reservation, ReservationRequest,
};
use gift_telegram::{verify_init_data, Update};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Mini App session header
pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

/// Secret Telegram echoes on every webhook delivery
pub const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Create order request. Required fields are optional here so a missing
/// one yields a 400 with a readable message.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub item_id: Option<i64>,
    #[serde(default)]
    pub model_id: Option<i64>,
    /// Ignored when a verified session is present
    #[serde(default)]
    pub donor_telegram_id: Option<i64>,
    #[serde(default)]
    pub donor_username: Option<String>,
    #[serde(default)]
    pub amount_xtr: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    #[serde(default)]
    pub item_id: Option<i64>,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    #[serde(default)]
    pub amount_xtr: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateInvoiceResponse {
    pub success: bool,
    #[serde(flatten)]
    pub invoice: InvoiceConfirmation,
}

#[derive(Debug, Deserialize)]
pub struct SendStarsRequest {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default, rename = "initData", alias = "init_data")]
    pub init_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendStarsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub ticket: DonationTicket,
}

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub model_id: i64,
    pub items: Vec<Item>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Set on reservation conflicts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_until: Option<DateTime<Utc>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
            reserved_until: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn gift_error_to_response(err: GiftError) -> ApiError {
    let code = err.status_code();
    if code >= 500 {
        error!("Request failed: {}", err);
    }
    let mut response = ErrorResponse::new(err.to_string(), code);
    response.reserved_until = err.reserved_until();
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    gift_error_to_response(GiftError::Validation(message.into()))
}

/// Malformed JSON is a 400 like any other validation failure
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid JSON body", 400).with_details(rejection.body_text())),
        )
    })
}

/// Donor from a verified `X-Telegram-Init-Data` header, if one was sent.
///
/// Without a bot token there is nothing to verify against and the header
/// is ignored.
fn session_donor(state: &AppState, headers: &HeaderMap) -> Result<Option<Donor>, ApiError> {
    let Some(init_data) = headers.get(INIT_DATA_HEADER).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let Some(token) = state.telegram.bot_token.as_deref() else {
        return Ok(None);
    };

    let user = verify_init_data(
        init_data,
        token,
        state.telegram.init_data_max_age_secs,
        Utc::now(),
    )
    .map_err(|e| {
        warn!("Rejected session initData: {}", e);
        gift_error_to_response(e.into())
    })?;

    Ok(Some(user.donor()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "wishlist-gift",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.backend_name(),
        "provider_configured": state.provider.is_configured()
    }))
}

/// Reserve an item and create its order
#[instrument(skip(state, headers, body))]
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<Reservation>, ApiError> {
    let request = json_body(body)?;

    let (Some(item_id), Some(model_id), Some(amount_xtr)) =
        (request.item_id, request.model_id, request.amount_xtr)
    else {
        return Err(bad_request("item_id, model_id and amount_xtr are required"));
    };

    let donor = match session_donor(&state, &headers)? {
        Some(donor) => Some(donor),
        // Clients without a Telegram user send 0
        None => request.donor_telegram_id.filter(|id| *id > 0).map(|id| Donor {
            telegram_id: id,
            username: request.donor_username.clone().filter(|u| !u.is_empty()),
        }),
    };

    let reservation = state
        .reservations
        .create_reservation(ReservationRequest {
            item_id,
            model_id,
            donor,
            amount_xtr,
            message: request.message,
        })
        .await
        .map_err(gift_error_to_response)?;

    Ok(Json(reservation))
}

/// Get an order by id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = Uuid::parse_str(&order_id).map_err(|_| bad_request("order_id must be a UUID"))?;

    let order = state
        .reservations
        .get_order(order_id)
        .await
        .map_err(gift_error_to_response)?;

    Ok(Json(order))
}

/// Send the Stars invoice for a reserved order
#[instrument(skip(state, body))]
pub async fn create_invoice(
    State(state): State<AppState>,
    body: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<Json<CreateInvoiceResponse>, ApiError> {
    let request = json_body(body)?;

    let (Some(item_id), Some(order_id), Some(amount_xtr)) =
        (request.item_id, request.order_id, request.amount_xtr)
    else {
        return Err(bad_request("item_id, order_id and amount_xtr are required"));
    };

    let invoice = state
        .invoices
        .issue_invoice(InvoiceRequest {
            item_id,
            order_id,
            amount_xtr,
            title: request.title,
        })
        .await
        .map_err(gift_error_to_response)?;

    Ok(Json(CreateInvoiceResponse {
        success: true,
        invoice,
    }))
}

/// Unattached donation paid from the Mini App
#[instrument(skip(state, body))]
pub async fn send_stars(
    State(state): State<AppState>,
    body: Result<Json<SendStarsRequest>, JsonRejection>,
) -> Result<Json<SendStarsResponse>, ApiError> {
    let request = json_body(body)?;

    let Some(token) = state.telegram.bot_token.as_deref() else {
        return Err(gift_error_to_response(GiftError::ProviderNotConfigured));
    };

    let amount = match request.amount {
        Some(amount) if amount >= 1 => amount,
        _ => return Err(bad_request("amount must be at least 1 Star")),
    };

    let Some(init_data) = request.init_data.filter(|d| !d.is_empty()) else {
        return Err(bad_request("initData is required. Open the app from Telegram."));
    };

    let user = verify_init_data(
        &init_data,
        token,
        state.telegram.init_data_max_age_secs,
        Utc::now(),
    )
    .map_err(|e| {
        warn!("Rejected donation initData: {}", e);
        gift_error_to_response(e.into())
    })?;

    let ticket = state
        .donations
        .create_donation(user.donor(), amount)
        .await
        .map_err(gift_error_to_response)?;

    Ok(Json(SendStarsResponse {
        success: true,
        ticket,
    }))
}

/// Telegram webhook. Acknowledges first; the update is processed on a
/// tracked task that shutdown drains.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if let Some(expected) = state.telegram.webhook_secret.as_deref() {
        let presented = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            warn!("Webhook delivery with a missing or wrong secret token");
            return Err(gift_error_to_response(GiftError::Unauthorized(
                "invalid webhook secret".to_string(),
            )));
        }
    }

    let processor = state.webhook.clone();
    let update = match Update::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Unparseable webhook body: {}", e);
            // A pre-checkout query still needs an answer inside its window
            if let Some(query_id) = pre_checkout_query_id(&body) {
                state.tasks.spawn(async move {
                    processor.reject_unreadable_pre_checkout(&query_id).await;
                });
            }
            return Ok(StatusCode::OK);
        }
    };

    let event = update.into_event();
    info!("Received webhook: {}", event.kind());

    state.tasks.spawn(async move {
        processor.handle(event).await;
    });

    Ok(StatusCode::OK)
}

/// `pre_checkout_query.id` of a body that failed typed parsing
fn pre_checkout_query_id(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("pre_checkout_query")?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

/// Public wishlist of a model
pub async fn model_wishlist(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
) -> Result<Json<WishlistResponse>, ApiError> {
    let items = state
        .store
        .items_for_model(model_id)
        .await
        .map_err(gift_error_to_response)?;

    Ok(Json(WishlistResponse { model_id, items }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_conflict_carries_reserved_until() {
        let until = Utc.with_ymd_and_hms(2026, 1, 1, 12, 10, 0).unwrap();
        let (status, Json(body)) = gift_error_to_response(GiftError::ItemAlreadyReserved {
            item_id: 7,
            reserved_until: until,
        });

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, 409);
        assert_eq!(body.reserved_until, Some(until));
    }

    #[test]
    fn test_error_statuses() {
        let cases = [
            (GiftError::MissingDonorIdentity, StatusCode::BAD_REQUEST),
            (GiftError::ProviderNotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (
                GiftError::InvoiceRejected {
                    reason: "chat not found".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                GiftError::Unauthorized("expired".into()),
                StatusCode::UNAUTHORIZED,
            ),
        ];
        for (err, expected) in cases {
            let (status, Json(body)) = gift_error_to_response(err);
            assert_eq!(status, expected);
            assert!(body.reserved_until.is_none());
        }
    }

    #[test]
    fn test_pre_checkout_query_id_from_malformed_update() {
        let body = br#"{"update_id": 1, "pre_checkout_query": {"id": "pcq-9", "total_amount": "lots"}}"#;
        assert_eq!(pre_checkout_query_id(body).as_deref(), Some("pcq-9"));
        assert_eq!(pre_checkout_query_id(br#"{"update_id": 1}"#), None);
        assert_eq!(pre_checkout_query_id(b"not json"), None);
    }

    #[test]
    fn test_send_stars_request_accepts_both_spellings() {
        let camel: SendStarsRequest =
            serde_json::from_str(r#"{"amount": 50, "initData": "a=b"}"#).unwrap();
        let snake: SendStarsRequest =
            serde_json::from_str(r#"{"amount": 50, "init_data": "a=b"}"#).unwrap();
        assert_eq!(camel.init_data.as_deref(), Some("a=b"));
        assert_eq!(snake.init_data.as_deref(), Some("a=b"));
    }
}

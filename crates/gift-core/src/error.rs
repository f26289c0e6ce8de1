//! # Gift Error Types
//!
//! Typed error handling for the wishlist-gift payment protocol.
//! All protocol operations return `Result<T, GiftError>`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Core error type for reservation, invoicing and settlement
#[derive(Debug, Error)]
pub enum GiftError {
    /// Missing or malformed input
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No donor could be resolved from the session or the request body
    #[error("Donor identity is required. Open the app from Telegram.")]
    MissingDonorIdentity,

    /// Another donor holds a live reservation on the item
    #[error("Item {item_id} is reserved until {reserved_until}")]
    ItemAlreadyReserved {
        item_id: i64,
        reserved_until: DateTime<Utc>,
    },

    /// Item has already been gifted or is otherwise not purchasable
    #[error("Item {item_id} is no longer available")]
    ItemUnavailable { item_id: i64 },

    /// Item not found (or soft-deleted)
    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: i64 },

    /// Order not found
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: Uuid },

    /// Donation not found
    #[error("Donation not found: {payload}")]
    DonationNotFound { payload: String },

    /// Signed identity missing, forged or stale
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider credential is not configured on this server
    #[error("Payment provider is not configured")]
    ProviderNotConfigured,

    /// The provider refused to create the invoice
    #[error("Invoice rejected: {reason}")]
    InvoiceRejected { reason: String },

    /// Network/HTTP error communicating with the provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A backing lookup did not finish in time
    #[error("Temporary failure: {0}")]
    Transient(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors (bad env values)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GiftError {
    /// Returns true if the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GiftError::NetworkError(_) | GiftError::Transient(_) | GiftError::Storage(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GiftError::Validation(_) => 400,
            GiftError::MissingDonorIdentity => 400,
            GiftError::ItemAlreadyReserved { .. } => 409,
            GiftError::ItemUnavailable { .. } => 409,
            GiftError::ItemNotFound { .. } => 404,
            GiftError::OrderNotFound { .. } => 404,
            GiftError::DonationNotFound { .. } => 404,
            GiftError::Unauthorized(_) => 401,
            GiftError::ProviderNotConfigured => 503,
            GiftError::InvoiceRejected { .. } => 502,
            GiftError::NetworkError(_) => 503,
            GiftError::Transient(_) => 503,
            GiftError::Storage(_) => 500,
            GiftError::Configuration(_) => 500,
            GiftError::Serialization(_) => 500,
            GiftError::Internal(_) => 500,
        }
    }

    /// Reservation expiry carried by a conflict, for countdown display
    pub fn reserved_until(&self) -> Option<DateTime<Utc>> {
        match self {
            GiftError::ItemAlreadyReserved { reserved_until, .. } => Some(*reserved_until),
            _ => None,
        }
    }
}

/// Result type alias for protocol operations
pub type GiftResult<T> = Result<T, GiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(GiftError::Transient("lookup timed out".into()).is_retryable());
        assert!(GiftError::NetworkError("reset".into()).is_retryable());
        assert!(!GiftError::Validation("bad data".into()).is_retryable());
        assert!(!GiftError::ProviderNotConfigured.is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GiftError::Validation("x".into()).status_code(), 400);
        assert_eq!(GiftError::MissingDonorIdentity.status_code(), 400);
        assert_eq!(
            GiftError::ItemAlreadyReserved {
                item_id: 7,
                reserved_until: Utc::now()
            }
            .status_code(),
            409
        );
        assert_eq!(
            GiftError::OrderNotFound {
                order_id: Uuid::new_v4()
            }
            .status_code(),
            404
        );
        assert_eq!(GiftError::Unauthorized("stale".into()).status_code(), 401);
        assert_eq!(GiftError::ProviderNotConfigured.status_code(), 503);
    }

    #[test]
    fn test_conflict_carries_expiry() {
        let until = Utc::now();
        let err = GiftError::ItemAlreadyReserved {
            item_id: 7,
            reserved_until: until,
        };
        assert_eq!(err.reserved_until(), Some(until));
        assert_eq!(GiftError::ItemUnavailable { item_id: 7 }.reserved_until(), None);
    }
}

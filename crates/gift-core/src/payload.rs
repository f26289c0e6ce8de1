//! # Invoice Payload
//!
//! The opaque string attached to every Stars invoice is the only thing the
//! provider echoes back in pre-checkout and payment callbacks. Internally it
//! is a tagged union; the `order:<uuid>` / `donate:<uuid>` text form exists
//! only at the provider boundary.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const ORDER_PREFIX: &str = "order:";
const DONATION_PREFIX: &str = "donate:";

/// Correlates a provider callback with the record that issued the invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoicePayload {
    /// Wishlist order
    Order(Uuid),
    /// Unattached donation ("tip")
    Donation(Uuid),
}

/// Why a payload string could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("unknown payload scheme")]
    UnknownScheme,

    #[error("malformed identifier in {kind} payload")]
    MalformedId { kind: PayloadKind },
}

/// Discriminant of an [`InvoicePayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Order,
    Donation,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Order => f.write_str("order"),
            PayloadKind::Donation => f.write_str("donation"),
        }
    }
}

impl InvoicePayload {
    /// Fresh donation payload
    pub fn new_donation() -> Self {
        InvoicePayload::Donation(Uuid::new_v4())
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            InvoicePayload::Order(_) => PayloadKind::Order,
            InvoicePayload::Donation(_) => PayloadKind::Donation,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            InvoicePayload::Order(id) | InvoicePayload::Donation(id) => *id,
        }
    }

    /// Provider wire form
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InvoicePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoicePayload::Order(id) => write!(f, "{ORDER_PREFIX}{id}"),
            InvoicePayload::Donation(id) => write!(f, "{DONATION_PREFIX}{id}"),
        }
    }
}

impl FromStr for InvoicePayload {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(ORDER_PREFIX) {
            Uuid::parse_str(rest)
                .map(InvoicePayload::Order)
                .map_err(|_| PayloadError::MalformedId {
                    kind: PayloadKind::Order,
                })
        } else if let Some(rest) = s.strip_prefix(DONATION_PREFIX) {
            Uuid::parse_str(rest)
                .map(InvoicePayload::Donation)
                .map_err(|_| PayloadError::MalformedId {
                    kind: PayloadKind::Donation,
                })
        } else {
            Err(PayloadError::UnknownScheme)
        }
    }
}

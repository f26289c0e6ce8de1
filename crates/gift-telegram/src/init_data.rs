//! # Mini App initData Verification
//!
//! The Mini App hands the server a query string signed with a key derived
//! from the bot token:
//!
//! ```text
//! secret = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! hash   = hex(HMAC_SHA256(key = secret, msg = data_check_string))
//! ```
//!
//! `data_check_string` is every `key=value` pair except `hash`, sorted and
//! joined with `\n`. Values are compared URL-decoded.

use chrono::{DateTime, Utc};
use gift_core::{Donor, GiftError};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why initData was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitDataError {
    #[error("initData is empty")]
    Empty,

    #[error("initData has no hash")]
    MissingHash,

    #[error("initData signature mismatch")]
    SignatureMismatch,

    #[error("initData is expired")]
    Expired,

    #[error("initData has no usable user")]
    InvalidUser,
}

impl From<InitDataError> for GiftError {
    fn from(err: InitDataError) -> Self {
        GiftError::Unauthorized(err.to_string())
    }
}

/// The Telegram user named in verified initData
#[derive(Debug, Clone, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl WebAppUser {
    pub fn donor(&self) -> Donor {
        Donor {
            telegram_id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Verify Mini App initData and return its user.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age_secs: i64,
    now: DateTime<Utc>,
) -> Result<WebAppUser, InitDataError> {
    if init_data.trim().is_empty() {
        return Err(InitDataError::Empty);
    }

    let pairs = decode_pairs(init_data)?;

    let hash = pairs
        .iter()
        .find(|(k, _)| k == "hash")
        .map(|(_, v)| v.as_str())
        .ok_or(InitDataError::MissingHash)?;

    let mut fields: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k != "hash")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    fields.sort();
    let data_check_string = fields.join("\n");

    let expected = compute_signature(bot_token, &data_check_string);
    if !constant_time_compare(&expected, &hash.to_ascii_lowercase()) {
        return Err(InitDataError::SignatureMismatch);
    }

    let auth_date = pairs
        .iter()
        .find(|(k, _)| k == "auth_date")
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .unwrap_or(0);
    if now.timestamp() - auth_date > max_age_secs {
        return Err(InitDataError::Expired);
    }

    let user = pairs
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.as_str())
        .ok_or(InitDataError::InvalidUser)?;
    let user: WebAppUser = serde_json::from_str(user).map_err(|_| InitDataError::InvalidUser)?;
    if user.id == 0 {
        return Err(InitDataError::InvalidUser);
    }

    Ok(user)
}

/// Form-urlencoded decoding, same rules as the browser's URLSearchParams
fn decode_pairs(init_data: &str) -> Result<Vec<(String, String)>, InitDataError> {
    let mut url = Url::parse("http://initdata.invalid/").map_err(|_| InitDataError::Empty)?;
    url.set_query(Some(init_data.trim_start_matches('?')));
    Ok(url.query_pairs().into_owned().collect())
}

fn compute_signature(bot_token: &str, data_check_string: &str) -> String {
    let secret = hmac_sha256(b"WebAppData", bot_token.as_bytes());
    hex::encode(hmac_sha256(&secret, data_check_string.as_bytes()))
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

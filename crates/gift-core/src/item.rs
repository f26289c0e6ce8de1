//! # Wishlist Items
//!
//! Wishlist item types and star pricing.
//! Items can be seeded from `config/wishlist.toml` for local development.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// USD value of one Telegram Star
pub const STAR_RATE_USD: f64 = 0.022;

/// Service fee charged on top of the base star cost
pub const SERVICE_FEE: f64 = 0.10;

/// Currencies a model may price an item in (display only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayCurrency {
    #[default]
    USD,
    EUR,
    RUB,
}

impl DisplayCurrency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayCurrency::USD => "USD",
            DisplayCurrency::EUR => "EUR",
            DisplayCurrency::RUB => "RUB",
        }
    }

    /// Parse a stored currency code; unknown codes fall back to USD
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "EUR" => DisplayCurrency::EUR,
            "RUB" => DisplayCurrency::RUB,
            _ => DisplayCurrency::USD,
        }
    }

    /// Conversion rate into USD
    pub fn usd_rate(&self) -> f64 {
        match self {
            DisplayCurrency::USD => 1.0,
            DisplayCurrency::EUR => 0.92,
            DisplayCurrency::RUB => 0.011,
        }
    }
}

impl std::fmt::Display for DisplayCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Star cost of an item: base + service fee = total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarCost {
    pub base: i64,
    pub fee: i64,
    pub total: i64,
}

impl StarCost {
    /// Convert a display price into stars.
    ///
    /// Each component is rounded on its own, so `base + fee` may differ
    /// from `total` by one star.
    pub fn from_price(price: f64, currency: DisplayCurrency) -> Self {
        let base = price * currency.usd_rate() / STAR_RATE_USD;
        Self {
            base: base.round() as i64,
            fee: (base * SERVICE_FEE).round() as i64,
            total: (base * (1.0 + SERVICE_FEE)).round() as i64,
        }
    }
}

/// Lifecycle status of a wishlist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Available,
    Reserved,
    Gifted,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "available",
            ItemStatus::Reserved => "reserved",
            ItemStatus::Gifted => "gifted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(ItemStatus::Available),
            "reserved" => Some(ItemStatus::Reserved),
            "gifted" => Some(ItemStatus::Gifted),
            _ => None,
        }
    }
}

/// A gift on a model's wishlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,

    /// Owning model
    pub model_id: i64,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Shop link
    #[serde(default)]
    pub url: Option<String>,

    /// Price in the display currency
    pub price: f64,

    #[serde(default)]
    pub currency: DisplayCurrency,

    pub stars: StarCost,

    /// Ordered photo references
    #[serde(default)]
    pub photos: Vec<String>,

    #[serde(default)]
    pub status: ItemStatus,

    /// Soft-delete flag
    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Item {
    /// Create an available item priced in a display currency
    pub fn new(
        id: i64,
        model_id: i64,
        name: impl Into<String>,
        price: f64,
        currency: DisplayCurrency,
    ) -> Self {
        Self {
            id,
            model_id,
            name: name.into(),
            description: String::new(),
            url: None,
            price,
            currency,
            stars: StarCost::from_price(price, currency),
            photos: Vec::new(),
            status: ItemStatus::Available,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set shop URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Builder: append a photo reference
    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photos.push(photo.into());
        self
    }

    /// Whether a donor may start a reservation on this item right now
    pub fn is_purchasable(&self) -> bool {
        self.active && self.status != ItemStatus::Gifted
    }
}

/// Items loaded from a TOML seed file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WishlistSeed {
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

/// Seed entry; the star cost is derived from the price
#[derive(Debug, Clone, Deserialize)]
pub struct SeedItem {
    pub id: i64,
    pub model_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub currency: DisplayCurrency,
    #[serde(default)]
    pub photos: Vec<String>,
}

impl WishlistSeed {
    /// Load seed items from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Materialize the seed into available items
    pub fn into_items(self) -> Vec<Item> {
        self.items
            .into_iter()
            .map(|seed| {
                let mut item = Item::new(seed.id, seed.model_id, seed.name, seed.price, seed.currency)
                    .with_description(seed.description);
                item.url = seed.url;
                item.photos = seed.photos;
                item
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_cost_usd() {
        // $22 = 1000 stars, fee 100, total 1100
        let cost = StarCost::from_price(22.0, DisplayCurrency::USD);
        assert_eq!(cost.base, 1000);
        assert_eq!(cost.fee, 100);
        assert_eq!(cost.total, 1100);
    }

    #[test]
    fn test_star_cost_rub() {
        // 2000 RUB = $22
        let cost = StarCost::from_price(2000.0, DisplayCurrency::RUB);
        assert_eq!(cost.base, 1000);
        assert_eq!(cost.total, 1100);
    }

    #[test]
    fn test_currency_fallback() {
        assert_eq!(DisplayCurrency::from_code("eur"), DisplayCurrency::EUR);
        assert_eq!(DisplayCurrency::from_code("JPY"), DisplayCurrency::USD);
    }

    #[test]
    fn test_item_builder() {
        let item = Item::new(7, 1, "Perfume", 55.0, DisplayCurrency::EUR)
            .with_description("50ml")
            .with_url("https://shop.example/perfume")
            .with_photo("p1.jpg")
            .with_photo("p2.jpg");

        assert_eq!(item.status, ItemStatus::Available);
        assert_eq!(item.photos, vec!["p1.jpg", "p2.jpg"]);
        assert!(item.is_purchasable());
    }

    #[test]
    fn test_gifted_item_not_purchasable() {
        let mut item = Item::new(7, 1, "Perfume", 55.0, DisplayCurrency::EUR);
        item.status = ItemStatus::Gifted;
        assert!(!item.is_purchasable());

        item.status = ItemStatus::Reserved;
        item.active = false;
        assert!(!item.is_purchasable());
    }

    #[test]
    fn test_seed_from_toml() {
        let seed = WishlistSeed::from_toml(
            r#"
            [[items]]
            id = 7
            model_id = 1
            name = "Headphones"
            price = 110.0
            currency = "USD"
            "#,
        )
        .unwrap();

        let items = seed.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].stars.base, 5000);
    }
}

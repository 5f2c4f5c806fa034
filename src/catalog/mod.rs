//! Catalog model and reconciliation
//!
//! This module holds the product records produced by extraction, the persisted
//! catalog entities, and the logic that matches one onto the other:
//! - Locale-aware price normalization
//! - Priority-ordered identity resolution and upsert with change tracking
//! - Identifier repair for maintenance runs

mod price;
mod reconcile;
mod repair;

pub use price::normalize_price;
pub use reconcile::{Reconciler, Reconciliation};
pub use repair::{reassign_identifier, RepairOutcome};

use chrono::{DateTime, Utc};

/// Product data extracted from a single page
///
/// Every attribute except the URL is optional. A record is only worth persisting
/// when it carries at least one identifier or a name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRecord {
    pub url: String,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub vvs: Option<String>,
    pub price_text: Option<String>,
    pub price_numeric: Option<f64>,
    pub currency: Option<String>,
    pub in_stock: Option<bool>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
}

impl ProductRecord {
    /// Creates an empty record for the given page URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Returns true if the record can be identified or displayed
    pub fn has_identity(&self) -> bool {
        self.sku.is_some() || self.ean.is_some() || self.vvs.is_some() || self.name.is_some()
    }

    /// Returns the lookups to try, highest priority first
    ///
    /// Identifiers the record does not carry are left out. The URL lookup is always
    /// last so that re-crawls where identifier extraction regressed still match.
    pub fn lookups(&self) -> Vec<Lookup> {
        let mut lookups = Vec::with_capacity(4);
        if let Some(sku) = &self.sku {
            lookups.push(Lookup::BySku(sku.clone()));
        }
        if let Some(ean) = &self.ean {
            lookups.push(Lookup::ByEan(ean.clone()));
        }
        if let Some(vvs) = &self.vvs {
            lookups.push(Lookup::ByVvs(vvs.clone()));
        }
        lookups.push(Lookup::ByUrl(self.url.clone()));
        lookups
    }

    /// Returns the value of an identifier
    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Sku => self.sku.as_deref(),
            IdentifierKind::Ean => self.ean.as_deref(),
            IdentifierKind::Vvs => self.vvs.as_deref(),
            IdentifierKind::Url => Some(self.url.as_str()),
        }
    }

    /// Parses `price_text` into `price_numeric` when the latter is not already set
    pub fn with_normalized_price(mut self) -> Self {
        if self.price_numeric.is_none() {
            self.price_numeric = self.price_text.as_deref().and_then(normalize_price);
        }
        self
    }
}

/// The keys a product can be looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Sku,
    Ean,
    Vvs,
    Url,
}

impl IdentifierKind {
    /// Column holding this identifier in the products table
    pub fn column(&self) -> &'static str {
        match self {
            Self::Sku => "sku",
            Self::Ean => "ean",
            Self::Vvs => "vvs",
            Self::Url => "url",
        }
    }

    pub fn from_column(s: &str) -> Option<Self> {
        match s {
            "sku" => Some(Self::Sku),
            "ean" => Some(Self::Ean),
            "vvs" => Some(Self::Vvs),
            "url" => Some(Self::Url),
            _ => None,
        }
    }

    /// Identifiers that carry a uniqueness constraint
    pub fn unique_kinds() -> [IdentifierKind; 3] {
        [Self::Sku, Self::Ean, Self::Vvs]
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// One step of the ordered identity lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    BySku(String),
    ByEan(String),
    ByVvs(String),
    ByUrl(String),
}

impl Lookup {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Self::BySku(_) => IdentifierKind::Sku,
            Self::ByEan(_) => IdentifierKind::Ean,
            Self::ByVvs(_) => IdentifierKind::Vvs,
            Self::ByUrl(_) => IdentifierKind::Url,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::BySku(v) | Self::ByEan(v) | Self::ByVvs(v) | Self::ByUrl(v) => v,
        }
    }
}

/// A product as stored in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedProduct {
    pub id: i64,
    pub product: ProductRecord,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of a stored product's attributes
#[derive(Debug, Clone)]
pub struct ProductPatch {
    pub product: ProductRecord,
    pub seen_at: DateTime<Utc>,
}

/// Fields whose changes are recorded in the product history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedField {
    Price,
    InStock,
    Name,
    Category,
}

impl WatchedField {
    pub const ALL: [WatchedField; 4] = [Self::Price, Self::InStock, Self::Name, Self::Category];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price_numeric",
            Self::InStock => "in_stock",
            Self::Name => "name",
            Self::Category => "category",
        }
    }

    /// Renders the field's value on a product for storage in the history table
    pub fn value_of(&self, product: &ProductRecord) -> Option<String> {
        match self {
            Self::Price => product.price_numeric.map(format_price),
            Self::InStock => product.in_stock.map(|s| s.to_string()),
            Self::Name => product.name.clone(),
            Self::Category => product.category.clone(),
        }
    }
}

/// A recorded change of one watched field
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub product_id: i64,
    pub field: WatchedField,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Formats a price with at most two decimals and no trailing zeros
fn format_price(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{:.2}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

//! Catalog, cart and customer types
//!
//! Domain snapshots handed to the dialogue layer, plus the JSON:API shapes
//! the store backend speaks.

use serde::{Deserialize, Serialize};

/// A price as the backend displays it (tax included)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    pub formatted: String,
}

/// Catalog item snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub unit_price: Price,
    pub main_image_ref: Option<String>,
}

/// One product quantity in a cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    /// Backend identifier of the line itself, used for removal
    pub line_id: String,
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
}

/// Cart contents with the backend-computed total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub total: Price,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A checkout registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub name: String,
    pub email: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireDisplayPrice {
    #[serde(default)]
    pub with_tax: Price,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WirePriceMeta {
    #[serde(default)]
    pub display_price: WireDisplayPrice,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRawPrice {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRelationshipData {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRelationship {
    pub data: Option<WireRelationshipData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireRelationships {
    pub main_image: Option<WireRelationship>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProduct {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Vec<WireRawPrice>,
    pub meta: Option<WirePriceMeta>,
    #[serde(default)]
    pub relationships: WireRelationships,
}

impl From<WireProduct> for Product {
    fn from(wire: WireProduct) -> Self {
        let unit_price = match (wire.meta, wire.price.first()) {
            (Some(meta), _) => meta.display_price.with_tax,
            (None, Some(raw)) => Price {
                amount: raw.amount,
                currency: raw.currency.clone(),
                formatted: format!("{} {}", raw.amount, raw.currency),
            },
            (None, None) => Price::default(),
        };
        let main_image_ref = wire
            .relationships
            .main_image
            .and_then(|rel| rel.data)
            .map(|data| data.id);

        Self {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            unit_price,
            main_image_ref,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFileLink {
    pub href: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFile {
    pub link: Option<WireFileLink>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireLineDisplayPrice {
    #[serde(default)]
    pub unit: Price,
    #[serde(default)]
    pub value: Price,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireLinePriceGroup {
    #[serde(default)]
    pub with_tax: WireLineDisplayPrice,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireLineMeta {
    #[serde(default)]
    pub display_price: WireLinePriceGroup,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCartItem {
    pub id: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: u32,
    #[serde(default)]
    pub meta: WireLineMeta,
}

impl From<WireCartItem> for CartLine {
    fn from(wire: WireCartItem) -> Self {
        let WireLineDisplayPrice { unit, value } = wire.meta.display_price.with_tax;
        Self {
            line_id: wire.id,
            product_id: wire.product_id,
            name: wire.name,
            description: wire.description,
            quantity: wire.quantity,
            unit_price: unit,
            line_total: value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCart {
    #[serde(default)]
    pub meta: WirePriceMeta,
}

#[derive(Debug, Serialize)]
pub(crate) struct CartItemRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomerRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RequestEnvelope<T> {
    pub data: T,
}

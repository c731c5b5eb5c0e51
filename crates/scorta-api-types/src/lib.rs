//! Shared request and response types for the Scorta inventory core API.
//!
//! Plain serde data: records returned by the core service, write payloads
//! sent to it, and list filters. No transport or caching logic lives here;
//! both the client data layer and tooling that speaks to the core depend on
//! this crate so the wire shapes stay in one place.
//!
//! All field names serialize in camelCase to match the core's JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

// ============================================================================
// Records
// ============================================================================

/// A sellable product tracked by the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    /// Alert threshold; stock at or below this level is considered low.
    pub stock_threshold: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub price: f64,
    pub price_vdi_ht: f64,
    pub price_distributor_ht: f64,
    pub price_sale_ht: f64,
    pub purchase_price: f64,
    pub tva_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Product {
    /// Active unless explicitly deactivated.
    pub fn is_active(&self) -> bool {
        self.is_active.unwrap_or(true)
    }
}

/// A physical or logical place where stock is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLocation {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StockLocation {
    /// Active unless explicitly deactivated.
    pub fn is_active(&self) -> bool {
        self.is_active.unwrap_or(true)
    }
}

/// A signed stock change for one product at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub stock_location_id: i64,
    /// Positive for entries, negative for exits.
    pub quantity_delta: i64,
    /// Free text; structured movements use `"CODE - details"`, see
    /// [`MovementReason::parse`].
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An absolute counted quantity for one product at one location.
///
/// Inventories override the running movement total as of their date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: i64,
    pub product_id: i64,
    pub stock_location_id: i64,
    pub quantity: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Current computed stock for one product, all locations combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub stock: i64,
}

/// Scope of a stock valuation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationScope {
    All,
    Location,
}

/// One point of the stock valuation time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockValuationPoint {
    pub valuation_date: Date,
    /// Total stock value in cents.
    pub total_value_cts: i64,
    pub currency: String,
    pub scope: ValuationScope,
    pub stock_location_id: Option<i64>,
    /// False for points computed on the fly rather than read from storage.
    pub persisted: bool,
}

// ============================================================================
// Write payloads
// ============================================================================

/// Payload for creating a product, or replacing every editable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    pub price_vdi_ht: f64,
    pub price_distributor_ht: f64,
    pub price_sale_ht: f64,
    pub purchase_price: f64,
    pub tva_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Partial product update; absent fields are left unchanged by the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_vdi_ht: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_distributor_ht: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sale_ht: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tva_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Payload for creating a stock location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDraft {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Partial stock location update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Payload for recording a stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStockMovement {
    pub product_id: i64,
    pub stock_location_id: i64,
    pub quantity_delta: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Backdated movements carry an explicit timestamp.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

/// Payload for recording an inventory count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInventory {
    pub product_id: i64,
    pub stock_location_id: i64,
    pub quantity: i64,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

// ============================================================================
// List filters
// ============================================================================

/// Product list filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// `Some(true)` restricts to active products, `None` lists all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Stock location list filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Movement journal filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

/// Stock valuation series query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationQuery {
    /// Trailing window length; the core defaults to 30 days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    /// `None` aggregates every location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_location_id: Option<i64>,
}

// ============================================================================
// Movement reasons
// ============================================================================

/// Structured vocabulary for movement reasons.
///
/// The wire `reason` field stays free text; structured entries use the code
/// alone (`"PERSO"`) or a code with details (`"PERSO - ajustement"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementReason {
    Facture,
    Avoir,
    #[default]
    Perso,
    Poubelle,
    Don,
    Inconnu,
}

/// Outcome of parsing a free-text reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReason {
    /// `None` when the text matches no known code.
    pub code: Option<MovementReason>,
    /// Trailing detail text after the `"CODE - "` separator, if any.
    pub details: Option<String>,
}

impl MovementReason {
    pub const ALL: [MovementReason; 6] = [
        MovementReason::Facture,
        MovementReason::Avoir,
        MovementReason::Perso,
        MovementReason::Poubelle,
        MovementReason::Don,
        MovementReason::Inconnu,
    ];

    /// Wire code, as stored in the movement `reason` field.
    pub fn code(&self) -> &'static str {
        match self {
            MovementReason::Facture => "FACTURE",
            MovementReason::Avoir => "AVOIR",
            MovementReason::Perso => "PERSO",
            MovementReason::Poubelle => "POUBELLE",
            MovementReason::Don => "DON",
            MovementReason::Inconnu => "INCONNU",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MovementReason::Facture => "Facture",
            MovementReason::Avoir => "Avoir",
            MovementReason::Perso => "Perso",
            MovementReason::Poubelle => "Poubelle",
            MovementReason::Don => "Don",
            MovementReason::Inconnu => "Inconnu",
        }
    }

    /// Parse a free-text reason into a known code plus optional details.
    ///
    /// Accepts the bare code or `"CODE - details"`; anything else yields a
    /// `ParsedReason` with no code and no details.
    pub fn parse(raw: &str) -> ParsedReason {
        let value = raw.trim();
        if value.is_empty() {
            return ParsedReason::default();
        }

        for reason in MovementReason::ALL {
            if value == reason.code() {
                return ParsedReason {
                    code: Some(reason),
                    details: None,
                };
            }
            let prefix = format!("{} -", reason.code());
            if let Some(rest) = value.strip_prefix(&prefix) {
                let details = rest.trim();
                return ParsedReason {
                    code: Some(reason),
                    details: (!details.is_empty()).then(|| details.to_string()),
                };
            }
        }

        ParsedReason::default()
    }
}

impl fmt::Display for MovementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn product_serializes_camel_case() {
        let product = Product {
            id: 7,
            name: "Croquettes 10kg".to_string(),
            sku: "CRQ-10".to_string(),
            stock_threshold: 5,
            description: None,
            image_url: None,
            price: 42.5,
            price_vdi_ht: 40.0,
            price_distributor_ht: 38.0,
            price_sale_ht: 45.0,
            purchase_price: 30.0,
            tva_rate: 20.0,
            is_active: Some(true),
            created_at: datetime!(2024-03-01 10:00 UTC),
            updated_at: datetime!(2024-03-02 10:00 UTC),
        };

        let json = serde_json::to_value(&product).expect("product serializes");
        assert_eq!(json["stockThreshold"], 5);
        assert_eq!(json["priceVdiHt"], 40.0);
        assert_eq!(json["isActive"], true);
        // Optional fields are omitted, not null
        assert!(json.get("description").is_none());
    }

    #[test]
    fn product_active_defaults_to_true() {
        let json = r#"{
            "id": 1, "name": "P", "sku": "S", "stockThreshold": 0,
            "price": 1.0, "priceVdiHt": 1.0, "priceDistributorHt": 1.0,
            "priceSaleHt": 1.0, "purchasePrice": 1.0, "tvaRate": 0.0,
            "createdAt": "2024-03-01T10:00:00Z", "updatedAt": "2024-03-01T10:00:00Z"
        }"#;
        let product: Product = serde_json::from_str(json).expect("product parses");
        assert!(product.is_active());
    }

    #[test]
    fn valuation_scope_uses_wire_codes() {
        assert_eq!(
            serde_json::to_string(&ValuationScope::All).expect("scope serializes"),
            "\"ALL\""
        );
        assert_eq!(
            serde_json::from_str::<ValuationScope>("\"LOCATION\"").expect("scope parses"),
            ValuationScope::Location
        );
    }

    #[test]
    fn movement_payload_skips_absent_fields() {
        let payload = NewStockMovement {
            product_id: 3,
            stock_location_id: 1,
            quantity_delta: -2,
            reason: None,
            created_at: None,
        };
        let json = serde_json::to_value(&payload).expect("payload serializes");
        assert_eq!(json["quantityDelta"], -2);
        assert!(json.get("reason").is_none());
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn reason_parses_exact_code() {
        let parsed = MovementReason::parse("FACTURE");
        assert_eq!(parsed.code, Some(MovementReason::Facture));
        assert_eq!(parsed.details, None);
    }

    #[test]
    fn reason_parses_code_with_details() {
        let parsed = MovementReason::parse("PERSO - ajustement");
        assert_eq!(parsed.code, Some(MovementReason::Perso));
        assert_eq!(parsed.details.as_deref(), Some("ajustement"));
    }

    #[test]
    fn reason_rejects_unknown_text() {
        assert_eq!(MovementReason::parse("UNKNOWN"), ParsedReason::default());
        assert_eq!(MovementReason::parse("  "), ParsedReason::default());
    }

    #[test]
    fn reason_labels_match_codes() {
        assert_eq!(MovementReason::Avoir.label(), "Avoir");
        assert_eq!(MovementReason::Inconnu.to_string(), "INCONNU");
        assert_eq!(MovementReason::default(), MovementReason::Perso);
    }
}

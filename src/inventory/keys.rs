//! Inventory query key vocabulary.
//!
//! Every cache identity used by the inventory screens, in one place so
//! query constructors and mutation invalidations cannot drift apart. Roots
//! (`["stock"]`, `["products"]`) exist for prefix invalidation only and are
//! never directly bound.

use scorta_api_types::{LocationFilter, ProductFilter, ValuationQuery};

use crate::cache::{KeyAtom, QueryKey};

/// Valuation window applied when a query does not name one.
pub const DEFAULT_VALUATION_DAYS: u32 = 30;

fn active_atom(active: Option<bool>) -> KeyAtom {
    match active {
        Some(flag) => KeyAtom::from(flag),
        None => KeyAtom::from("all"),
    }
}

pub fn products(filter: &ProductFilter) -> QueryKey {
    QueryKey::from("products").with(active_atom(filter.active))
}

pub fn products_root() -> QueryKey {
    QueryKey::from("products")
}

/// An absent id keys as `null`; such bindings mount disabled.
pub fn product(product_id: Option<i64>) -> QueryKey {
    QueryKey::from("product").with(KeyAtom::from(product_id))
}

pub fn stock(product_id: Option<i64>) -> QueryKey {
    QueryKey::from("stock").with(KeyAtom::from(product_id))
}

pub fn stock_root() -> QueryKey {
    QueryKey::from("stock")
}

pub fn stock_variations(product_id: Option<i64>) -> QueryKey {
    QueryKey::from("stock")
        .with(KeyAtom::from(product_id))
        .with("variations")
}

pub fn movements(product_id: Option<i64>) -> QueryKey {
    QueryKey::from("movements").with(KeyAtom::from(product_id))
}

/// The cross-product movement journal.
pub fn movement_journal() -> QueryKey {
    QueryKey::from("stock-movements")
}

pub fn inventories(product_id: Option<i64>) -> QueryKey {
    QueryKey::from("inventories").with(KeyAtom::from(product_id))
}

pub fn inventories_root() -> QueryKey {
    QueryKey::from("inventories")
}

pub fn stock_locations(filter: &LocationFilter) -> QueryKey {
    QueryKey::from("stockLocations").with(active_atom(filter.active))
}

pub fn stock_locations_root() -> QueryKey {
    QueryKey::from("stockLocations")
}

pub fn default_stock_location() -> QueryKey {
    QueryKey::from("stockLocations").with("default")
}

pub fn stock_valuations(query: &ValuationQuery) -> QueryKey {
    let location = match query.stock_location_id {
        Some(id) => KeyAtom::from(id),
        None => KeyAtom::from("all"),
    };
    QueryKey::from("stockValuations")
        .with(query.days.unwrap_or(DEFAULT_VALUATION_DAYS))
        .with(location)
}

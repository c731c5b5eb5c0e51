//! Inventory data facade.
//!
//! Binds the generic cache layer to the inventory domain: the
//! [`InventoryApi`] boundary, the query key vocabulary, and the
//! [`InventoryQueries`] factory whose mutations carry the invalidation
//! topology (a recorded movement freshens the journal and the product's
//! stock family, a product edit freshens the product lists, and so on).

pub mod api;
pub mod keys;
mod queries;

pub use api::{ApiError, InventoryApi};
pub use queries::{InventoryQueries, LocationUpdate, ProductUpdate};

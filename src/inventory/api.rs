//! Remote inventory API boundary.
//!
//! The cache layer knows nothing about HTTP; this trait is the seam where
//! a transport implementation (or a test stub) plugs in. Method shapes
//! mirror the core service's REST surface one-to-one.

use async_trait::async_trait;
use thiserror::Error;

use scorta_api_types::{
    Inventory, LocationDraft, LocationFilter, LocationPatch, MovementFilter, NewInventory,
    NewStockMovement, Product, ProductDraft, ProductFilter, ProductPatch, StockLevel,
    StockLocation, StockMovement, StockValuationPoint, ValuationQuery,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The session is gone; the caller must re-authenticate.
    #[error("session expired, sign in again")]
    Unauthorized,
    /// The service answered with a non-success status.
    #[error("API {code}: {message}")]
    Status { code: u16, message: String },
    /// The request never produced a response.
    #[error("transport failure: {message}")]
    Transport { message: String },
}

impl ApiError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Everything the inventory screens read from or write to the core
/// service.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn list_products(&self, filter: ProductFilter) -> Result<Vec<Product>, ApiError>;
    async fn get_product(&self, product_id: i64) -> Result<Product, ApiError>;
    async fn stock_for_product(&self, product_id: i64) -> Result<StockLevel, ApiError>;
    async fn stock_variations(&self, product_id: i64) -> Result<Vec<StockMovement>, ApiError>;
    async fn movements_by_product(&self, product_id: i64)
    -> Result<Vec<StockMovement>, ApiError>;
    async fn list_movements(&self, filter: MovementFilter)
    -> Result<Vec<StockMovement>, ApiError>;
    async fn inventories_by_product(&self, product_id: i64) -> Result<Vec<Inventory>, ApiError>;
    async fn list_stock_locations(
        &self,
        filter: LocationFilter,
    ) -> Result<Vec<StockLocation>, ApiError>;
    async fn default_stock_location(&self) -> Result<StockLocation, ApiError>;
    async fn list_stock_valuations(
        &self,
        query: ValuationQuery,
    ) -> Result<Vec<StockValuationPoint>, ApiError>;
    async fn create_movement(&self, movement: NewStockMovement)
    -> Result<StockMovement, ApiError>;
    async fn create_inventory(&self, inventory: NewInventory) -> Result<Inventory, ApiError>;
    async fn create_product(&self, draft: ProductDraft) -> Result<Product, ApiError>;
    async fn update_product(&self, product_id: i64, patch: ProductPatch)
    -> Result<Product, ApiError>;
    async fn create_stock_location(&self, draft: LocationDraft)
    -> Result<StockLocation, ApiError>;
    async fn update_stock_location(
        &self,
        location_id: i64,
        patch: LocationPatch,
    ) -> Result<StockLocation, ApiError>;
}

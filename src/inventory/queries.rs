//! Inventory query and mutation constructors.
//!
//! One place binding every inventory screen to the cache: each constructor
//! pairs a key from [`super::keys`] with the matching [`InventoryApi`]
//! call, and each mutation carries the invalidation set its write affects.
//! Screens hold the returned bindings; they never touch keys directly.

use std::sync::Arc;

use scorta_api_types::{
    Inventory, LocationDraft, LocationFilter, LocationPatch, MovementFilter, NewInventory,
    NewStockMovement, Product, ProductDraft, ProductFilter, ProductPatch, StockLevel,
    StockLocation, StockMovement, StockValuationPoint, ValuationQuery,
};

use crate::binding::{
    MutationBinding, QueryBatch, QueryBinding, QueryDescriptor, QueryOptions, fetcher,
};
use crate::cache::{QueryClient, QueryError, context};

use super::api::{ApiError, InventoryApi};
use super::keys;

fn fetch_error(err: ApiError) -> QueryError {
    QueryError::fetch(err.to_string())
}

fn mutation_error(err: ApiError) -> QueryError {
    QueryError::mutation(err.to_string())
}

/// Variables for [`InventoryQueries::update_product`].
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub id: i64,
    pub patch: ProductPatch,
}

/// Variables for [`InventoryQueries::update_stock_location`].
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    pub id: i64,
    pub patch: LocationPatch,
}

/// Factory for inventory bindings over one shared cache and one API
/// implementation.
pub struct InventoryQueries<A> {
    client: QueryClient,
    api: Arc<A>,
}

impl<A> InventoryQueries<A>
where
    A: InventoryApi + 'static,
{
    pub fn new(client: QueryClient, api: Arc<A>) -> Self {
        Self { client, api }
    }

    /// Build against the ambient client installed by
    /// [`context::with_client`](crate::cache::context::with_client).
    ///
    /// # Panics
    ///
    /// Panics outside a provisioning scope.
    pub fn from_context(api: Arc<A>) -> Self {
        Self::new(context::current(), api)
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn products(&self, filter: ProductFilter) -> QueryBinding<Vec<Product>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::products(&filter),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move { api.list_products(filter).await.map_err(fetch_error) }
            }),
            QueryOptions::default(),
        )
    }

    /// `None` mounts the binding disabled; screens pass the id straight
    /// from their route parameters, which may not have resolved yet.
    pub fn product(&self, product_id: Option<i64>) -> QueryBinding<Product> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::product(product_id),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move {
                    let id = missing_id(product_id)?;
                    api.get_product(id).await.map_err(fetch_error)
                }
            }),
            QueryOptions {
                enabled: product_id.is_some(),
            },
        )
    }

    pub fn product_stock(&self, product_id: Option<i64>) -> QueryBinding<StockLevel> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::stock(product_id),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move {
                    let id = missing_id(product_id)?;
                    api.stock_for_product(id).await.map_err(fetch_error)
                }
            }),
            QueryOptions {
                enabled: product_id.is_some(),
            },
        )
    }

    pub fn product_stock_variations(
        &self,
        product_id: Option<i64>,
    ) -> QueryBinding<Vec<StockMovement>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::stock_variations(product_id),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move {
                    let id = missing_id(product_id)?;
                    api.stock_variations(id).await.map_err(fetch_error)
                }
            }),
            QueryOptions {
                enabled: product_id.is_some(),
            },
        )
    }

    pub fn product_movements(&self, product_id: Option<i64>) -> QueryBinding<Vec<StockMovement>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::movements(product_id),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move {
                    let id = missing_id(product_id)?;
                    api.movements_by_product(id).await.map_err(fetch_error)
                }
            }),
            QueryOptions {
                enabled: product_id.is_some(),
            },
        )
    }

    pub fn product_inventories(&self, product_id: Option<i64>) -> QueryBinding<Vec<Inventory>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::inventories(product_id),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move {
                    let id = missing_id(product_id)?;
                    api.inventories_by_product(id).await.map_err(fetch_error)
                }
            }),
            QueryOptions {
                enabled: product_id.is_some(),
            },
        )
    }

    /// The journal lists every movement regardless of product; the filter
    /// shapes the response without entering the cache key.
    pub fn movement_journal(&self, filter: MovementFilter) -> QueryBinding<Vec<StockMovement>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::movement_journal(),
            fetcher(move || {
                let api = Arc::clone(&api);
                let filter = filter.clone();
                async move { api.list_movements(filter).await.map_err(fetch_error) }
            }),
            QueryOptions::default(),
        )
    }

    pub fn stock_locations(&self, filter: LocationFilter) -> QueryBinding<Vec<StockLocation>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::stock_locations(&filter),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move { api.list_stock_locations(filter).await.map_err(fetch_error) }
            }),
            QueryOptions::default(),
        )
    }

    pub fn default_stock_location(&self) -> QueryBinding<StockLocation> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::default_stock_location(),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move { api.default_stock_location().await.map_err(fetch_error) }
            }),
            QueryOptions::default(),
        )
    }

    pub fn stock_valuations(&self, query: ValuationQuery) -> QueryBinding<Vec<StockValuationPoint>> {
        let api = Arc::clone(&self.api);
        QueryBinding::mount(
            &self.client,
            keys::stock_valuations(&query),
            fetcher(move || {
                let api = Arc::clone(&api);
                async move { api.list_stock_valuations(query).await.map_err(fetch_error) }
            }),
            QueryOptions::default(),
        )
    }

    // =========================================================================
    // Batched dashboards
    // =========================================================================

    /// Stock level per product, one slot per id in order.
    pub fn stock_for_products(&self, product_ids: &[i64]) -> QueryBatch<StockLevel> {
        let descriptors = product_ids
            .iter()
            .map(|&id| {
                let api = Arc::clone(&self.api);
                QueryDescriptor::new(
                    keys::stock(Some(id)),
                    fetcher(move || {
                        let api = Arc::clone(&api);
                        async move { api.stock_for_product(id).await.map_err(fetch_error) }
                    }),
                )
            })
            .collect();
        QueryBatch::mount(&self.client, descriptors)
    }

    pub fn inventories_for_products(&self, product_ids: &[i64]) -> QueryBatch<Vec<Inventory>> {
        let descriptors = product_ids
            .iter()
            .map(|&id| {
                let api = Arc::clone(&self.api);
                QueryDescriptor::new(
                    keys::inventories(Some(id)),
                    fetcher(move || {
                        let api = Arc::clone(&api);
                        async move { api.inventories_by_product(id).await.map_err(fetch_error) }
                    }),
                )
            })
            .collect();
        QueryBatch::mount(&self.client, descriptors)
    }

    pub fn movements_for_products(&self, product_ids: &[i64]) -> QueryBatch<Vec<StockMovement>> {
        let descriptors = product_ids
            .iter()
            .map(|&id| {
                let api = Arc::clone(&self.api);
                QueryDescriptor::new(
                    keys::movements(Some(id)),
                    fetcher(move || {
                        let api = Arc::clone(&api);
                        async move { api.movements_by_product(id).await.map_err(fetch_error) }
                    }),
                )
            })
            .collect();
        QueryBatch::mount(&self.client, descriptors)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Record a stock movement. Freshens the journal and the product's
    /// stock family; the `["stock", id]` prefix also covers the
    /// variations entry.
    pub fn create_movement(&self) -> MutationBinding<NewStockMovement, StockMovement> {
        let api = Arc::clone(&self.api);
        let client = self.client.clone();
        MutationBinding::new(move |movement: NewStockMovement| {
            let api = Arc::clone(&api);
            async move { api.create_movement(movement).await.map_err(mutation_error) }
        })
        .on_success(move |_movement, variables| {
            client.invalidate_queries(&keys::movement_journal());
            client.invalidate_queries(&keys::stock(Some(variables.product_id)));
            client.invalidate_queries(&keys::movements(Some(variables.product_id)));
        })
    }

    /// Record a counted inventory for a product.
    pub fn create_inventory(&self) -> MutationBinding<NewInventory, Inventory> {
        let api = Arc::clone(&self.api);
        let client = self.client.clone();
        MutationBinding::new(move |inventory: NewInventory| {
            let api = Arc::clone(&api);
            async move { api.create_inventory(inventory).await.map_err(mutation_error) }
        })
        .on_success(move |_inventory, variables| {
            client.invalidate_queries(&keys::inventories(Some(variables.product_id)));
            client.invalidate_queries(&keys::stock(Some(variables.product_id)));
        })
    }

    pub fn create_product(&self) -> MutationBinding<ProductDraft, Product> {
        let api = Arc::clone(&self.api);
        let client = self.client.clone();
        MutationBinding::new(move |draft: ProductDraft| {
            let api = Arc::clone(&api);
            async move { api.create_product(draft).await.map_err(mutation_error) }
        })
        .on_success(move |_product, _variables| {
            client.invalidate_queries(&keys::products_root());
        })
    }

    pub fn update_product(&self) -> MutationBinding<ProductUpdate, Product> {
        let api = Arc::clone(&self.api);
        let client = self.client.clone();
        MutationBinding::new(move |update: ProductUpdate| {
            let api = Arc::clone(&api);
            async move {
                api.update_product(update.id, update.patch)
                    .await
                    .map_err(mutation_error)
            }
        })
        .on_success(move |_product, variables| {
            client.invalidate_queries(&keys::product(Some(variables.id)));
            client.invalidate_queries(&keys::products_root());
        })
    }

    pub fn create_stock_location(&self) -> MutationBinding<LocationDraft, StockLocation> {
        let api = Arc::clone(&self.api);
        let client = self.client.clone();
        MutationBinding::new(move |draft: LocationDraft| {
            let api = Arc::clone(&api);
            async move {
                api.create_stock_location(draft)
                    .await
                    .map_err(mutation_error)
            }
        })
        .on_success(move |_location, _variables| {
            client.invalidate_queries(&keys::stock_locations_root());
        })
    }

    pub fn update_stock_location(&self) -> MutationBinding<LocationUpdate, StockLocation> {
        let api = Arc::clone(&self.api);
        let client = self.client.clone();
        MutationBinding::new(move |update: LocationUpdate| {
            let api = Arc::clone(&api);
            async move {
                api.update_stock_location(update.id, update.patch)
                    .await
                    .map_err(mutation_error)
            }
        })
        .on_success(move |_location, _variables| {
            client.invalidate_queries(&keys::stock_locations_root());
        })
    }
}

fn missing_id(product_id: Option<i64>) -> Result<i64, QueryError> {
    product_id.ok_or_else(|| QueryError::fetch("product id not set"))
}

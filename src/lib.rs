//! Scorta query cache.
//!
//! Client-side reactive data layer for the Scorta inventory UI: a
//! key-addressed cache store with prefix invalidation ([`cache`]), UI
//! bindings that keep per-consumer state in step with it ([`binding`]),
//! and the inventory facade wiring keys, fetch functions, and mutation
//! invalidation topology to the remote core service ([`inventory`]).
//!
//! The crate is transport-agnostic: [`inventory::InventoryApi`] is the
//! seam where an HTTP client, or a test stub, plugs in. [`telemetry`]
//! installs the tracing subscriber and registers metric descriptions for
//! hosts that want them.

pub mod binding;
pub mod cache;
pub mod inventory;
pub mod telemetry;

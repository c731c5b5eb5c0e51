//! UI-facing cache bindings.
//!
//! A binding mediates between one UI consumer and the shared
//! [`QueryClient`](crate::cache::QueryClient):
//!
//! - [`QueryBinding`]: one key, one fetch function, read-through state
//! - [`QueryBatch`]: N positional descriptors, each with independent state
//! - [`MutationBinding`]: imperative writes with pending/success/error state
//!
//! Bindings own their listener registrations and deregister on drop; a
//! torn-down binding never applies late fetch results to its state.

mod batch;
mod mutation;
mod query;

pub use batch::{QueryBatch, QueryDescriptor};
pub use mutation::{MutationBinding, MutationSnapshot};
pub use query::{Fetcher, QueryBinding, QueryOptions, QuerySnapshot, fetcher};

//! Scorta Query Cache
//!
//! Key-addressed read-through cache shared by every query and mutation
//! binding:
//!
//! - **Keys**: hierarchical scalar paths (`["stock", 42]`), structurally
//!   hashed, prefix-matchable
//! - **Store**: one typed entry per key with data, error, and listeners;
//!   single write path with synchronous fan-out
//! - **Context**: task-scoped ambient [`QueryClient`] injection
//!
//! ## Configuration
//!
//! Cache behavior is controlled via the host's settings file:
//!
//! ```toml
//! [cache]
//! log_events = true
//! ```

mod config;
pub mod context;
mod error;
mod events;
mod key;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use context::ContextError;
pub use error::QueryError;
pub use events::{ListenerId, QueryEvent, Subscription};
pub use key::{KeyAtom, QueryKey};
pub use store::QueryClient;

//! Cache configuration.
//!
//! Embeddable under a `[cache]` table in a host settings file. The store is
//! deliberately unbounded (UI-session lifetime, small key cardinality), so
//! there are no capacity knobs; configuration covers observability only.

use serde::Deserialize;

const DEFAULT_LOG_EVENTS: bool = true;

/// Cache behavior knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Emit an info-level log line for every event fan-out.
    ///
    /// Worth turning off when a high-frequency view writes the store every
    /// frame; reads and writes still log at debug level.
    pub log_events: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            log_events: DEFAULT_LOG_EVENTS,
        }
    }
}

//! Cache events and listener subscriptions.
//!
//! Entry listeners receive `QueryEvent`s synchronously from the store's
//! write, invalidate, and remove paths. Registration hands back an RAII
//! [`Subscription`] guard; dropping it deregisters the listener.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::key::QueryKey;
use super::store::QueryStore;

/// Monotonic identifier for a registered listener.
pub type ListenerId = u64;

/// Callback registered against exactly one cache entry.
pub(crate) type Listener = Arc<dyn Fn(QueryEvent) + Send + Sync>;

/// Lifecycle notification for one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    /// Entry data was replaced through the write path; the error was cleared.
    Updated,
    /// Entry was marked stale. Data and error are untouched; subscribers
    /// decide whether to refetch.
    Invalidated,
    /// Entry data and error were cleared. The slot itself is retained.
    Removed,
}

impl QueryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryEvent::Updated => "updated",
            QueryEvent::Invalidated => "invalidated",
            QueryEvent::Removed => "removed",
        }
    }
}

impl fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard for a registered cache listener.
///
/// The listener stays registered for the guard's lifetime. Dropping the
/// guard (or calling [`Subscription::unsubscribe`]) deregisters it; events
/// dispatched while the drop races a notification round may still reach the
/// listener once, which bindings tolerate by checking their own liveness.
#[must_use = "dropping a subscription immediately deregisters its listener"]
pub struct Subscription {
    store: Arc<QueryStore>,
    key: QueryKey,
    id: ListenerId,
}

impl Subscription {
    pub(crate) fn new(store: Arc<QueryStore>, key: QueryKey, id: ListenerId) -> Self {
        Self { store, key, id }
    }

    /// Key this subscription is registered under.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Deregister explicitly. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.unsubscribe(&self.key, self.id);
        debug!(key = %self.key, listener_id = self.id, "Cache listener unsubscribed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

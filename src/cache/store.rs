//! Query cache storage.
//!
//! One process-wide store shared by every binding: typed entries keyed by
//! [`QueryKey`], a single write path, prefix invalidation and removal, and
//! synchronous listener fan-out. Values are stored type-erased; typed reads
//! downcast and clone.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::error::QueryError;
use super::events::{Listener, ListenerId, QueryEvent, Subscription};
use super::key::QueryKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT_TOTAL: &str = "scorta_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "scorta_cache_miss_total";
const METRIC_CACHE_WRITE_TOTAL: &str = "scorta_cache_write_total";
const METRIC_CACHE_INVALIDATE_TOTAL: &str = "scorta_cache_invalidate_total";
const METRIC_CACHE_REMOVE_TOTAL: &str = "scorta_cache_remove_total";
const METRIC_CACHE_ENTRIES: &str = "scorta_cache_entries";
const METRIC_QUERY_FETCH_MS: &str = "scorta_query_fetch_ms";

type StoredValue = Arc<dyn Any + Send + Sync>;

/// One cache slot: last fetched value, last cleared-or-clear error, and the
/// listeners registered against this key, in subscription order.
#[derive(Default)]
struct EntrySlot {
    data: Option<StoredValue>,
    error: Option<QueryError>,
    listeners: Vec<(ListenerId, Listener)>,
}

impl EntrySlot {
    fn listener_snapshot(&self) -> Vec<Listener> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Store internals behind the [`QueryClient`] handle.
///
/// Entries are created lazily by writes and subscriptions and never deleted;
/// removal clears a slot's contents but keeps the slot registered. Listener
/// fan-out snapshots the listener list under the lock and invokes it after
/// releasing, so handlers may freely re-enter the store.
pub(crate) struct QueryStore {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, EntrySlot>>,
    listener_seq: AtomicU64,
}

impl QueryStore {
    fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            listener_seq: AtomicU64::new(0),
        }
    }

    fn write(&self, key: &QueryKey, value: StoredValue) {
        let listeners = {
            let mut entries = mutex_lock(&self.entries, SOURCE, "write");
            let slot = entries.entry(key.clone()).or_default();
            slot.data = Some(value);
            slot.error = None;
            let listeners = slot.listener_snapshot();
            gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
            listeners
        };
        counter!(METRIC_CACHE_WRITE_TOTAL).increment(1);
        debug!(key = %key, "Query cache write");
        self.dispatch(key, QueryEvent::Updated, listeners);
    }

    /// Collect matching entries under one lock acquisition, applying `mutate`
    /// to each slot, and return their keys with listener snapshots in
    /// canonical key order.
    fn collect_prefix_matches(
        &self,
        prefix: &QueryKey,
        op: &'static str,
        mutate: impl Fn(&mut EntrySlot),
    ) -> Vec<(QueryKey, Vec<Listener>)> {
        let mut matches: Vec<(QueryKey, Vec<Listener>)> = {
            let mut entries = mutex_lock(&self.entries, SOURCE, op);
            entries
                .iter_mut()
                .filter(|(key, _)| prefix.is_prefix_of(key))
                .map(|(key, slot)| {
                    mutate(slot);
                    (key.clone(), slot.listener_snapshot())
                })
                .collect()
        };
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches
    }

    fn dispatch(&self, key: &QueryKey, event: QueryEvent, listeners: Vec<Listener>) {
        // Observable: one line per fan-out, gated for high-frequency writers
        if self.config.log_events {
            info!(
                key = %key,
                event = event.as_str(),
                listener_count = listeners.len(),
                "Cache event dispatched"
            );
        }
        for listener in listeners {
            listener(event);
        }
    }

    pub(crate) fn unsubscribe(&self, key: &QueryKey, id: ListenerId) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "unsubscribe");
        if let Some(slot) = entries.get_mut(key) {
            slot.listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }
}

/// Handle to the shared query cache.
///
/// Cloning is cheap and every clone addresses the same store; the instance
/// is an explicit value injected where needed (see [`super::context`]), not
/// a process global.
#[derive(Clone)]
pub struct QueryClient {
    store: Arc<QueryStore>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            store: Arc::new(QueryStore::new(config)),
        }
    }

    /// Current cached value for `key`, or `None` if nothing was ever set.
    ///
    /// A read never allocates an entry. Reading under a different type than
    /// was written reports `None`; reusing one key at two types is a
    /// programmer error this layer does not guard.
    pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = {
            let entries = mutex_lock(&self.store.entries, SOURCE, "get_query_data");
            entries.get(key).and_then(|slot| slot.data.clone())
        };
        match value.and_then(|any| any.downcast::<T>().ok()) {
            Some(value) => {
                counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
                debug!(key = %key, "Query cache hit");
                Some(value.as_ref().clone())
            }
            None => {
                counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
                debug!(key = %key, "Query cache miss");
                None
            }
        }
    }

    /// Replace the entry's data, clear its error, and synchronously notify
    /// the entry's listeners with [`QueryEvent::Updated`].
    ///
    /// This is the single write path, used by fetches and direct seeding
    /// alike. All notifications complete before the call returns.
    pub fn set_query_data<T>(&self, key: &QueryKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.store.write(key, Arc::new(value));
    }

    /// Updater form of [`QueryClient::set_query_data`]: the closure receives
    /// the previous cached value, and its result is written back.
    ///
    /// Read and write are two store operations; concurrent writers resolve
    /// last-write-wins, same as racing fetches.
    pub fn update_query_data<T>(&self, key: &QueryKey, update: impl FnOnce(Option<T>) -> T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let previous = self.get_query_data::<T>(key);
        self.set_query_data(key, update(previous));
    }

    /// Notify every entry under `prefix` with [`QueryEvent::Invalidated`].
    ///
    /// Data and error contents are untouched; subscribed bindings decide
    /// whether to refetch. Matched entries notify in canonical key order.
    pub fn invalidate_queries(&self, prefix: &QueryKey) {
        let matches = self
            .store
            .collect_prefix_matches(prefix, "invalidate_queries", |_| {});
        counter!(METRIC_CACHE_INVALIDATE_TOTAL).increment(matches.len() as u64);
        info!(prefix = %prefix, matched = matches.len(), "Query cache invalidated");
        for (key, listeners) in matches {
            self.store.dispatch(&key, QueryEvent::Invalidated, listeners);
        }
    }

    /// Clear data and error for every entry under `prefix`, then notify with
    /// [`QueryEvent::Removed`]. Slots stay registered for future reuse.
    pub fn remove_queries(&self, prefix: &QueryKey) {
        let matches = self
            .store
            .collect_prefix_matches(prefix, "remove_queries", |slot| {
                slot.data = None;
                slot.error = None;
            });
        counter!(METRIC_CACHE_REMOVE_TOTAL).increment(matches.len() as u64);
        info!(prefix = %prefix, matched = matches.len(), "Query cache entries removed");
        for (key, listeners) in matches {
            self.store.dispatch(&key, QueryEvent::Removed, listeners);
        }
    }

    /// Imperative one-off fetch: await `fetch`, write the result through the
    /// store, and return it.
    ///
    /// A failed fetch propagates the error without touching the entry, and
    /// without recording the error anywhere retrievable; the caller owns it.
    pub async fn fetch_query<T>(
        &self,
        key: &QueryKey,
        fetch: impl Future<Output = Result<T, QueryError>>,
    ) -> Result<T, QueryError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let started_at = Instant::now();
        match fetch.await {
            Ok(value) => {
                histogram!(METRIC_QUERY_FETCH_MS, "outcome" => "ok")
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);
                self.set_query_data(key, value.clone());
                Ok(value)
            }
            Err(err) => {
                histogram!(METRIC_QUERY_FETCH_MS, "outcome" => "error")
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);
                warn!(key = %key, error = %err, "Query fetch failed");
                Err(err)
            }
        }
    }

    /// Register `listener` on the entry for `key`, lazily creating the
    /// entry. The returned guard deregisters on drop.
    ///
    /// Listeners on one entry are notified in subscription order. A listener
    /// may subscribe, unsubscribe, or write the store from inside its own
    /// notification; the in-progress fan-out round is unaffected.
    pub fn subscribe(
        &self,
        key: QueryKey,
        listener: impl Fn(QueryEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.store.listener_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut entries = mutex_lock(&self.store.entries, SOURCE, "subscribe");
            let slot = entries.entry(key.clone()).or_default();
            slot.listeners.push((id, Arc::new(listener)));
            gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
        }
        debug!(key = %key, listener_id = id, "Cache listener subscribed");
        Subscription::new(Arc::clone(&self.store), key, id)
    }

    /// Number of allocated entry slots, including cleared ones.
    pub fn entry_count(&self) -> usize {
        mutex_lock(&self.store.entries, SOURCE, "entry_count").len()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

//! Single-query binding.
//!
//! Attaches one fetch function to one cache key for the lifetime of a UI
//! consumer: seeds from the cache on mount, fetches when nothing is cached,
//! refetches on invalidation, and mirrors every cache update into a local
//! `{data, error, is_loading}` snapshot. State transitions are announced on
//! a watch channel so hosts can re-render on change.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::histogram;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::lock::mutex_lock;
use crate::cache::{QueryClient, QueryError, QueryEvent, QueryKey, Subscription};

const SOURCE: &str = "binding::query";

const METRIC_QUERY_FETCH_MS: &str = "scorta_query_fetch_ms";

/// Zero-argument async fetch function, shareable across refetches.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

/// Box an async closure into a [`Fetcher`].
pub fn fetcher<T, F, Fut>(fetch: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
{
    Arc::new(move || fetch().boxed())
}

/// Mount-time options for a [`QueryBinding`].
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// A disabled binding never invokes its fetch function; it still adopts
    /// cache updates pushed by other writers.
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Point-in-time view of a binding's local state.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
    pub data: Option<T>,
    pub error: Option<QueryError>,
    pub is_loading: bool,
}

impl<T> QuerySnapshot<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T> Default for QuerySnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
        }
    }
}

struct BindingState<T> {
    key: QueryKey,
    fetch_fn: Fetcher<T>,
    /// Bumped on every key change; in-flight work from an older generation
    /// may finish its cache write but no longer touches local state.
    generation: u64,
    in_flight: bool,
    data: Option<T>,
    error: Option<QueryError>,
    is_loading: bool,
}

struct QueryShared<T> {
    state: Mutex<BindingState<T>>,
    changed: watch::Sender<u64>,
    alive: AtomicBool,
    enabled: bool,
    handle: Handle,
}

impl<T> QueryShared<T> {
    fn bump(&self) {
        self.changed.send_modify(|version| *version += 1);
    }
}

/// Read-through binding for one query key.
///
/// Mounting requires a Tokio runtime: the current handle is captured so
/// invalidation events observed on arbitrary threads can spawn refetches.
pub struct QueryBinding<T> {
    client: QueryClient,
    shared: Arc<QueryShared<T>>,
    subscription: Subscription,
}

impl<T> QueryBinding<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Attach to `key` with `fetch_fn`.
    ///
    /// Seeding: cached data is adopted as-is with `is_loading = false`;
    /// with nothing cached an enabled binding starts a background fetch,
    /// a disabled one sits idle.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn mount(
        client: &QueryClient,
        key: impl Into<QueryKey>,
        fetch_fn: Fetcher<T>,
        options: QueryOptions,
    ) -> Self {
        let key = key.into();
        let handle = Handle::current();
        let cached = client.get_query_data::<T>(&key);
        let needs_fetch = options.enabled && cached.is_none();
        let (changed, _) = watch::channel(0u64);

        let shared = Arc::new(QueryShared {
            state: Mutex::new(BindingState {
                key: key.clone(),
                fetch_fn,
                generation: 0,
                in_flight: false,
                data: cached,
                error: None,
                is_loading: needs_fetch,
            }),
            changed,
            alive: AtomicBool::new(true),
            enabled: options.enabled,
            handle,
        });

        let subscription = subscribe_binding(client, &key, &shared);
        debug!(key = %key, enabled = options.enabled, "Query binding mounted");

        let binding = Self {
            client: client.clone(),
            shared,
            subscription,
        };
        if needs_fetch {
            spawn_refetch(&binding.shared, &binding.client);
        }
        binding
    }

    /// Re-point the binding, the re-render path for parameterized screens.
    ///
    /// An unchanged key swaps the fetch function only. A new key bumps the
    /// generation, re-subscribes, re-seeds from the cache, and fetches when
    /// enabled with nothing cached.
    pub fn set_query(&mut self, key: impl Into<QueryKey>, fetch_fn: Fetcher<T>) {
        let key = key.into();
        {
            let mut state = mutex_lock(&self.shared.state, SOURCE, "set_query");
            if state.key == key {
                state.fetch_fn = fetch_fn;
                return;
            }
        }

        let cached = self.client.get_query_data::<T>(&key);
        let needs_fetch = self.shared.enabled && cached.is_none();
        {
            let mut state = mutex_lock(&self.shared.state, SOURCE, "set_query");
            state.generation += 1;
            state.in_flight = false;
            state.key = key.clone();
            state.fetch_fn = fetch_fn;
            state.data = cached;
            state.is_loading = needs_fetch;
            if needs_fetch {
                state.error = None;
            }
        }
        self.shared.bump();

        // Registers the new listener before the old guard drops
        self.subscription = subscribe_binding(&self.client, &key, &self.shared);
        debug!(key = %key, "Query binding re-keyed");

        if needs_fetch {
            spawn_refetch(&self.shared, &self.client);
        }
    }

    /// Force a fetch for the current key, reusing the in-flight guard: a
    /// redundant call returns the cache's current value without a second
    /// request.
    pub async fn refetch(&self) -> Option<T> {
        run_fetch(&self.shared, &self.client).await
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        let state = mutex_lock(&self.shared.state, SOURCE, "snapshot");
        QuerySnapshot {
            data: state.data.clone(),
            error: state.error.clone(),
            is_loading: state.is_loading,
        }
    }

    pub fn data(&self) -> Option<T> {
        mutex_lock(&self.shared.state, SOURCE, "data").data.clone()
    }

    pub fn error(&self) -> Option<QueryError> {
        mutex_lock(&self.shared.state, SOURCE, "error").error.clone()
    }

    pub fn is_loading(&self) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "is_loading").is_loading
    }

    pub fn is_error(&self) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "is_error").error.is_some()
    }

    /// Key currently bound.
    pub fn key(&self) -> QueryKey {
        mutex_lock(&self.shared.state, SOURCE, "key").key.clone()
    }

    /// Version channel bumped on every state transition; the re-render
    /// signal for hosts and tests.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changed.subscribe()
    }
}

impl<T> Drop for QueryBinding<T> {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
    }
}

fn subscribe_binding<T>(
    client: &QueryClient,
    key: &QueryKey,
    shared: &Arc<QueryShared<T>>,
) -> Subscription
where
    T: Clone + Send + Sync + 'static,
{
    let epoch = mutex_lock(&shared.state, SOURCE, "subscribe").generation;
    let listener_shared = Arc::clone(shared);
    let listener_client = client.clone();
    let listener_key = key.clone();
    client.subscribe(key.clone(), move |event| {
        if !listener_shared.alive.load(Ordering::SeqCst) {
            return;
        }
        match event {
            QueryEvent::Updated => {
                let cached = listener_client.get_query_data::<T>(&listener_key);
                {
                    let mut state = mutex_lock(&listener_shared.state, SOURCE, "adopt_update");
                    if state.generation != epoch {
                        return;
                    }
                    state.data = cached;
                    state.error = None;
                    state.is_loading = false;
                }
                listener_shared.bump();
            }
            QueryEvent::Invalidated | QueryEvent::Removed => {
                if !listener_shared.enabled {
                    return;
                }
                {
                    let state = mutex_lock(&listener_shared.state, SOURCE, "check_epoch");
                    if state.generation != epoch {
                        return;
                    }
                }
                spawn_refetch(&listener_shared, &listener_client);
            }
        }
    })
}

fn spawn_refetch<T>(shared: &Arc<QueryShared<T>>, client: &QueryClient)
where
    T: Clone + Send + Sync + 'static,
{
    let handle = shared.handle.clone();
    let shared = Arc::clone(shared);
    let client = client.clone();
    handle.spawn(async move {
        let _ = run_fetch(&shared, &client).await;
    });
}

/// The shared fetch path behind mount, invalidation, and `refetch()`.
///
/// Returns the fetched value, the cache's current value when a fetch is
/// already in flight, or `None` when disabled or failed.
async fn run_fetch<T>(shared: &Arc<QueryShared<T>>, client: &QueryClient) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    if !shared.enabled {
        return None;
    }

    let (key, fetch_fn, generation) = {
        let mut state = mutex_lock(&shared.state, SOURCE, "claim_fetch");
        if state.in_flight {
            let key = state.key.clone();
            drop(state);
            debug!(key = %key, "Fetch already in flight, returning cached value");
            return client.get_query_data::<T>(&key);
        }
        state.in_flight = true;
        state.is_loading = true;
        state.error = None;
        (state.key.clone(), Arc::clone(&state.fetch_fn), state.generation)
    };
    shared.bump();

    let started_at = Instant::now();
    match fetch_fn().await {
        Ok(value) => {
            histogram!(METRIC_QUERY_FETCH_MS, "outcome" => "ok")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            // The write lands under the fetched key even when this binding
            // has since been re-keyed or dropped
            client.set_query_data(&key, value.clone());
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "apply_fetch_success");
                if state.generation == generation {
                    state.in_flight = false;
                    if shared.alive.load(Ordering::SeqCst) {
                        state.data = Some(value.clone());
                        state.is_loading = false;
                    }
                }
            }
            shared.bump();
            Some(value)
        }
        Err(err) => {
            histogram!(METRIC_QUERY_FETCH_MS, "outcome" => "error")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            warn!(key = %key, error = %err, "Query fetch failed");
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "apply_fetch_failure");
                if state.generation == generation {
                    state.in_flight = false;
                    if shared.alive.load(Ordering::SeqCst) {
                        state.error = Some(err);
                        state.is_loading = false;
                    }
                }
            }
            shared.bump();
            None
        }
    }
}

//! Batched-query binding.
//!
//! Array-oriented variant of [`QueryBinding`](super::QueryBinding): N
//! descriptors, one state slot per positional index, each slot seeded,
//! fetched, and failed independently. One in-flight key set is shared
//! across the whole batch so two slots over the same key never fetch
//! concurrently.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::histogram;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::lock::mutex_lock;
use crate::cache::{QueryClient, QueryEvent, QueryKey, Subscription};

use super::query::{Fetcher, QuerySnapshot};

const SOURCE: &str = "binding::batch";

const METRIC_QUERY_FETCH_MS: &str = "scorta_query_fetch_ms";

/// One batched query: key, fetch function, enabled flag.
pub struct QueryDescriptor<T> {
    key: QueryKey,
    fetch_fn: Fetcher<T>,
    enabled: bool,
}

impl<T> QueryDescriptor<T> {
    pub fn new(key: impl Into<QueryKey>, fetch_fn: Fetcher<T>) -> Self {
        Self {
            key: key.into(),
            fetch_fn,
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<T> Clone for QueryDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch_fn: Arc::clone(&self.fetch_fn),
            enabled: self.enabled,
        }
    }
}

struct BatchState<T> {
    descriptors: Vec<QueryDescriptor<T>>,
    slots: Vec<QuerySnapshot<T>>,
    /// Bumped on every key-list change; completions from an older
    /// generation keep their cache write but skip local slots.
    generation: u64,
    /// Keys currently fetching, shared across all slots and kept across
    /// structural changes.
    in_flight: HashSet<QueryKey>,
}

struct BatchShared<T> {
    state: Mutex<BatchState<T>>,
    changed: watch::Sender<u64>,
    alive: AtomicBool,
    handle: Handle,
}

impl<T> BatchShared<T> {
    fn bump(&self) {
        self.changed.send_modify(|version| *version += 1);
    }
}

/// Read-through binding over an ordered descriptor list.
///
/// The exposed state array is positionally parallel to the input
/// descriptors, never keyed by key identity.
pub struct QueryBatch<T> {
    client: QueryClient,
    shared: Arc<BatchShared<T>>,
    subscriptions: Vec<Subscription>,
}

impl<T> QueryBatch<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Attach to `descriptors`, seeding each slot from the cache.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn mount(client: &QueryClient, descriptors: Vec<QueryDescriptor<T>>) -> Self {
        let handle = Handle::current();
        let slots = seed_slots(client, &descriptors);
        debug!(descriptors = descriptors.len(), "Query batch mounted");

        let shared = Arc::new(BatchShared {
            state: Mutex::new(BatchState {
                descriptors,
                slots,
                generation: 0,
                in_flight: HashSet::new(),
            }),
            changed: watch::channel(0u64).0,
            alive: AtomicBool::new(true),
            handle,
        });

        let mut batch = Self {
            client: client.clone(),
            shared,
            subscriptions: Vec::new(),
        };
        batch.subscriptions = subscribe_all(&batch.client, &batch.shared);
        kick_fetches(&batch.shared, &batch.client);
        batch
    }

    /// Swap the descriptor list, the re-render path.
    ///
    /// A changed key list re-seeds every slot from the cache and
    /// re-subscribes from scratch; a changed enabled list alone kicks
    /// fetches for newly-enabled slots without touching existing state;
    /// an identical structure swaps fetch functions only. The in-flight
    /// key set persists across all three.
    pub fn set_queries(&mut self, descriptors: Vec<QueryDescriptor<T>>) {
        let (keys_changed, newly_enabled) = {
            let state = mutex_lock(&self.shared.state, SOURCE, "set_queries");
            let keys_changed = state.descriptors.len() != descriptors.len()
                || state
                    .descriptors
                    .iter()
                    .zip(&descriptors)
                    .any(|(old, new)| old.key != new.key);
            let newly_enabled: Vec<(usize, QueryKey)> = if keys_changed {
                Vec::new()
            } else {
                state
                    .descriptors
                    .iter()
                    .zip(&descriptors)
                    .enumerate()
                    .filter(|(_, (old, new))| !old.enabled && new.enabled)
                    .map(|(index, (_, new))| (index, new.key.clone()))
                    .collect()
            };
            (keys_changed, newly_enabled)
        };

        if keys_changed {
            let slots = seed_slots(&self.client, &descriptors);
            {
                let mut state = mutex_lock(&self.shared.state, SOURCE, "set_queries");
                state.generation += 1;
                state.descriptors = descriptors;
                state.slots = slots;
            }
            self.shared.bump();
            debug!(descriptors = self.len(), "Query batch re-keyed");
            self.subscriptions = subscribe_all(&self.client, &self.shared);
            kick_fetches(&self.shared, &self.client);
            return;
        }

        {
            let mut state = mutex_lock(&self.shared.state, SOURCE, "set_queries");
            state.descriptors = descriptors;
        }
        for (index, key) in newly_enabled {
            if self.client.get_query_data::<T>(&key).is_none() {
                spawn_slot_refetch(&self.shared, &self.client, index);
            }
        }
    }

    /// Force a fetch for the slot at `index`; out-of-range indexes and
    /// in-flight keys are no-ops.
    pub async fn refetch(&self, index: usize) {
        run_slot_fetch(&self.shared, &self.client, index).await;
    }

    /// Positional state array, parallel to the descriptor list.
    pub fn snapshot(&self) -> Vec<QuerySnapshot<T>> {
        mutex_lock(&self.shared.state, SOURCE, "snapshot").slots.clone()
    }

    /// State of one slot, if present.
    pub fn slot(&self, index: usize) -> Option<QuerySnapshot<T>> {
        mutex_lock(&self.shared.state, SOURCE, "slot")
            .slots
            .get(index)
            .cloned()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.shared.state, SOURCE, "len").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version channel bumped on every state transition.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changed.subscribe()
    }
}

impl<T> Drop for QueryBatch<T> {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
    }
}

fn seed_slots<T>(client: &QueryClient, descriptors: &[QueryDescriptor<T>]) -> Vec<QuerySnapshot<T>>
where
    T: Clone + Send + Sync + 'static,
{
    descriptors
        .iter()
        .map(|descriptor| {
            let cached = client.get_query_data::<T>(&descriptor.key);
            let is_loading = descriptor.enabled && cached.is_none();
            QuerySnapshot {
                data: cached,
                error: None,
                is_loading,
            }
        })
        .collect()
}

fn subscribe_all<T>(client: &QueryClient, shared: &Arc<BatchShared<T>>) -> Vec<Subscription>
where
    T: Clone + Send + Sync + 'static,
{
    let targets: Vec<(usize, QueryKey, u64)> = {
        let state = mutex_lock(&shared.state, SOURCE, "subscribe_all");
        state
            .descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| (index, descriptor.key.clone(), state.generation))
            .collect()
    };

    targets
        .into_iter()
        .map(|(index, key, epoch)| {
            let listener_shared = Arc::clone(shared);
            let listener_client = client.clone();
            let listener_key = key.clone();
            client.subscribe(key, move |event| {
                if !listener_shared.alive.load(Ordering::SeqCst) {
                    return;
                }
                match event {
                    QueryEvent::Updated => {
                        let cached = listener_client.get_query_data::<T>(&listener_key);
                        {
                            let mut state =
                                mutex_lock(&listener_shared.state, SOURCE, "adopt_update");
                            if state.generation != epoch {
                                return;
                            }
                            if let Some(slot) = state.slots.get_mut(index) {
                                slot.data = cached;
                                slot.error = None;
                                slot.is_loading = false;
                            }
                        }
                        listener_shared.bump();
                    }
                    QueryEvent::Invalidated | QueryEvent::Removed => {
                        {
                            let state =
                                mutex_lock(&listener_shared.state, SOURCE, "check_epoch");
                            if state.generation != epoch {
                                return;
                            }
                            // Enabled-only changes do not re-subscribe; read the flag live
                            if !state.descriptors.get(index).is_some_and(|d| d.enabled) {
                                return;
                            }
                        }
                        spawn_slot_refetch(&listener_shared, &listener_client, index);
                    }
                }
            })
        })
        .collect()
}

fn kick_fetches<T>(shared: &Arc<BatchShared<T>>, client: &QueryClient)
where
    T: Clone + Send + Sync + 'static,
{
    let candidates: Vec<(usize, QueryKey)> = {
        let state = mutex_lock(&shared.state, SOURCE, "kick_fetches");
        state
            .descriptors
            .iter()
            .enumerate()
            .filter(|(_, descriptor)| descriptor.enabled)
            .map(|(index, descriptor)| (index, descriptor.key.clone()))
            .collect()
    };
    for (index, key) in candidates {
        if client.get_query_data::<T>(&key).is_none() {
            spawn_slot_refetch(shared, client, index);
        }
    }
}

fn spawn_slot_refetch<T>(shared: &Arc<BatchShared<T>>, client: &QueryClient, index: usize)
where
    T: Clone + Send + Sync + 'static,
{
    let handle = shared.handle.clone();
    let shared = Arc::clone(shared);
    let client = client.clone();
    handle.spawn(async move {
        run_slot_fetch(&shared, &client, index).await;
    });
}

/// The shared per-slot fetch path: claims the slot's key in the batch-wide
/// in-flight set, fetches with the slot's current descriptor, writes
/// through the cache, and applies state bounded by index, liveness, and
/// generation.
async fn run_slot_fetch<T>(shared: &Arc<BatchShared<T>>, client: &QueryClient, index: usize)
where
    T: Clone + Send + Sync + 'static,
{
    let (key, fetch_fn, generation) = {
        let mut state = mutex_lock(&shared.state, SOURCE, "claim_slot_fetch");
        let Some(descriptor) = state.descriptors.get(index) else {
            return;
        };
        if !descriptor.enabled {
            return;
        }
        let key = descriptor.key.clone();
        let fetch_fn = Arc::clone(&descriptor.fetch_fn);
        if !state.in_flight.insert(key.clone()) {
            debug!(key = %key, index, "Slot fetch already in flight for this key");
            return;
        }
        if let Some(slot) = state.slots.get_mut(index) {
            slot.is_loading = true;
            slot.error = None;
        }
        (key, fetch_fn, state.generation)
    };
    shared.bump();

    let started_at = Instant::now();
    match fetch_fn().await {
        Ok(value) => {
            histogram!(METRIC_QUERY_FETCH_MS, "outcome" => "ok")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            client.set_query_data(&key, value.clone());
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "apply_slot_success");
                state.in_flight.remove(&key);
                if state.generation == generation && shared.alive.load(Ordering::SeqCst) {
                    if let Some(slot) = state.slots.get_mut(index) {
                        *slot = QuerySnapshot {
                            data: Some(value),
                            error: None,
                            is_loading: false,
                        };
                    }
                }
            }
            shared.bump();
        }
        Err(err) => {
            histogram!(METRIC_QUERY_FETCH_MS, "outcome" => "error")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            warn!(key = %key, index, error = %err, "Slot fetch failed");
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "apply_slot_failure");
                state.in_flight.remove(&key);
                if state.generation == generation && shared.alive.load(Ordering::SeqCst) {
                    if let Some(slot) = state.slots.get_mut(index) {
                        slot.error = Some(err);
                        slot.is_loading = false;
                    }
                }
            }
            shared.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};

    use super::super::query::fetcher;
    use super::*;
    use crate::cache::QueryError;

    fn stock_key(product_id: i64) -> QueryKey {
        QueryKey::from("stock").with(product_id)
    }

    fn counting_fetcher(value: i64, calls: &Arc<AtomicUsize>) -> Fetcher<i64> {
        let calls = Arc::clone(calls);
        fetcher(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }
        })
    }

    async fn wait_for<P>(batch: &QueryBatch<i64>, pred: P)
    where
        P: Fn(&[QuerySnapshot<i64>]) -> bool,
    {
        let mut changes = batch.changes();
        timeout(Duration::from_secs(1), async {
            loop {
                if pred(&batch.snapshot()) {
                    return;
                }
                changes.changed().await.expect("batch alive");
            }
        })
        .await
        .expect("expected state before timeout");
    }

    #[tokio::test]
    async fn mount_returns_one_slot_per_descriptor() {
        let client = QueryClient::new();
        client.set_query_data(&stock_key(1), 10i64);
        let calls = Arc::new(AtomicUsize::new(0));

        let batch = QueryBatch::mount(
            &client,
            vec![
                QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls)),
                QueryDescriptor::new(stock_key(2), counting_fetcher(20, &calls)),
                QueryDescriptor::new(stock_key(3), counting_fetcher(0, &calls)).enabled(false),
            ],
        );

        assert_eq!(batch.len(), 3);
        let slots = batch.snapshot();
        assert_eq!(slots[0].data, Some(10));
        assert!(!slots[0].is_loading);
        assert!(slots[1].is_loading);
        assert!(!slots[2].is_loading);

        wait_for(&batch, |slots| slots[1].data == Some(20)).await;
        sleep(Duration::from_millis(20)).await;
        // Cached and disabled slots never fetched
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reordering_descriptors_reseeds_positionally() {
        let client = QueryClient::new();
        client.set_query_data(&stock_key(1), 10i64);
        client.set_query_data(&stock_key(2), 20i64);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut batch = QueryBatch::mount(
            &client,
            vec![
                QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls)),
                QueryDescriptor::new(stock_key(2), counting_fetcher(0, &calls)),
            ],
        );
        let before: Vec<_> = batch.snapshot().into_iter().map(|s| s.data).collect();
        assert_eq!(before, vec![Some(10), Some(20)]);

        batch.set_queries(vec![
            QueryDescriptor::new(stock_key(2), counting_fetcher(0, &calls)),
            QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls)),
        ]);

        let after: Vec<_> = batch.snapshot().into_iter().map(|s| s.data).collect();
        assert_eq!(after, vec![Some(20), Some(10)]);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slots_fail_independently() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let batch = QueryBatch::mount(
            &client,
            vec![
                QueryDescriptor::new(
                    stock_key(1),
                    fetcher(|| async { Err::<i64, _>(QueryError::fetch("offline")) }),
                ),
                QueryDescriptor::new(stock_key(2), counting_fetcher(20, &calls)),
            ],
        );

        wait_for(&batch, |slots| {
            slots[0].is_error() && slots[1].data == Some(20)
        })
        .await;

        let slots = batch.snapshot();
        assert_eq!(slots[0].error, Some(QueryError::fetch("offline")));
        assert_eq!(slots[0].data, None);
        assert!(slots[1].error.is_none());
    }

    #[tokio::test]
    async fn two_slots_over_one_key_share_a_single_fetch() {
        let client = QueryClient::new();
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let shared_fetcher = {
            let entered = Arc::clone(&entered);
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            fetcher(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let entered = Arc::clone(&entered);
                let gate = Arc::clone(&gate);
                async move {
                    entered.notify_one();
                    gate.notified().await;
                    Ok(5i64)
                }
            })
        };

        let batch = QueryBatch::mount(
            &client,
            vec![
                QueryDescriptor::new(stock_key(1), Arc::clone(&shared_fetcher)),
                QueryDescriptor::new(stock_key(1), shared_fetcher),
            ],
        );

        timeout(Duration::from_secs(1), entered.notified())
            .await
            .expect("fetch should start");
        gate.notify_one();

        wait_for(&batch, |slots| {
            slots[0].data == Some(5) && slots[1].data == Some(5)
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enabling_a_slot_kicks_its_fetch_without_reseeding_siblings() {
        let client = QueryClient::new();
        client.set_query_data(&stock_key(1), 10i64);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut batch = QueryBatch::mount(
            &client,
            vec![
                QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls)),
                QueryDescriptor::new(stock_key(2), counting_fetcher(20, &calls)).enabled(false),
            ],
        );
        sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!batch.snapshot()[1].is_loading);

        batch.set_queries(vec![
            QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls)),
            QueryDescriptor::new(stock_key(2), counting_fetcher(20, &calls)),
        ]);

        wait_for(&batch, |slots| slots[1].data == Some(20)).await;
        assert_eq!(batch.snapshot()[0].data, Some(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_reaches_a_slot_enabled_after_mount() {
        let client = QueryClient::new();
        client.set_query_data(&stock_key(1), 10i64);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut batch = QueryBatch::mount(
            &client,
            vec![QueryDescriptor::new(stock_key(1), counting_fetcher(11, &calls)).enabled(false)],
        );
        batch.set_queries(vec![QueryDescriptor::new(
            stock_key(1),
            counting_fetcher(11, &calls),
        )]);
        // Cached data means enabling alone fetches nothing
        sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        client.invalidate_queries(&stock_key(1));
        wait_for(&batch, |slots| slots[0].data == Some(11)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_refetch_is_a_no_op() {
        let client = QueryClient::new();
        client.set_query_data(&stock_key(1), 10i64);
        let calls = Arc::new(AtomicUsize::new(0));

        let batch = QueryBatch::mount(
            &client,
            vec![QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls))],
        );
        batch.refetch(9).await;
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn update_events_only_touch_their_own_slot() {
        let client = QueryClient::new();
        client.set_query_data(&stock_key(1), 10i64);
        client.set_query_data(&stock_key(2), 20i64);
        let calls = Arc::new(AtomicUsize::new(0));

        let batch = QueryBatch::mount(
            &client,
            vec![
                QueryDescriptor::new(stock_key(1), counting_fetcher(0, &calls)),
                QueryDescriptor::new(stock_key(2), counting_fetcher(0, &calls)),
            ],
        );

        client.set_query_data(&stock_key(2), 21i64);

        let slots = batch.snapshot();
        assert_eq!(slots[0].data, Some(10));
        assert_eq!(slots[1].data, Some(21));
    }
}

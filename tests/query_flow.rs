//! Query bindings sharing one cache: write-through visibility across
//! bindings, disabled mounts, and fetches that outlive their binding.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

use scorta::binding::{Fetcher, QueryBinding, QueryOptions, fetcher};
use scorta::cache::{QueryClient, QueryKey};

fn counting_fetcher(value: i64, calls: &Arc<AtomicUsize>) -> Fetcher<i64> {
    let calls = Arc::clone(calls);
    fetcher(move || {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    })
}

async fn wait_until<T>(binding: &QueryBinding<T>, done: impl Fn(&QueryBinding<T>) -> bool)
where
    T: Clone + Send + Sync + 'static,
{
    timeout(Duration::from_secs(1), async {
        let mut changes = binding.changes();
        while !done(binding) {
            changes
                .changed()
                .await
                .expect("binding closed its change feed");
        }
    })
    .await
    .expect("binding did not reach the expected state in time");
}

#[tokio::test]
async fn one_refetch_feeds_every_binding_on_the_key() {
    let client = QueryClient::new();
    let key = QueryKey::from("stock").with(7);
    client.set_query_data(&key, 5i64);

    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));
    let first = QueryBinding::mount(
        &client,
        key.clone(),
        counting_fetcher(6, &first_calls),
        QueryOptions::default(),
    );
    let second = QueryBinding::mount(
        &client,
        key.clone(),
        counting_fetcher(99, &second_calls),
        QueryOptions::default(),
    );
    assert_eq!(first.data(), Some(5));
    assert_eq!(second.data(), Some(5));

    let refetched = first.refetch().await;
    assert_eq!(refetched, Some(6));

    // The write fans out through the cache; the second fetcher never runs
    wait_until(&second, |binding| binding.data() == Some(6)).await;
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disabled_bindings_stay_idle() {
    let client = QueryClient::new();
    let key = QueryKey::from("product").with(3);
    let calls = Arc::new(AtomicUsize::new(0));

    let binding = QueryBinding::mount(
        &client,
        key.clone(),
        counting_fetcher(1, &calls),
        QueryOptions { enabled: false },
    );

    assert!(!binding.is_loading());
    assert_eq!(binding.data(), None);
    assert_eq!(binding.refetch().await, None);

    client.invalidate_queries(&key);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(client.get_query_data::<i64>(&key).is_none());
}

#[tokio::test]
async fn a_dropped_binding_finishes_its_write_for_the_next_mount() {
    let client = QueryClient::new();
    let key = QueryKey::from("movements").with(2);

    let release = Arc::new(Notify::new());
    let entered = Arc::new(Notify::new());
    let parked: Fetcher<i64> = {
        let release = Arc::clone(&release);
        let entered = Arc::clone(&entered);
        fetcher(move || {
            let release = Arc::clone(&release);
            let entered = Arc::clone(&entered);
            async move {
                entered.notify_one();
                release.notified().await;
                Ok(31)
            }
        })
    };

    let binding = QueryBinding::mount(&client, key.clone(), parked, QueryOptions::default());
    entered.notified().await;
    drop(binding);
    release.notify_one();

    timeout(Duration::from_secs(1), async {
        while client.get_query_data::<i64>(&key).is_none() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("write should land after the binding is gone");

    // The next mount starts from the finished write instead of refetching
    let calls = Arc::new(AtomicUsize::new(0));
    let next = QueryBinding::mount(
        &client,
        key,
        counting_fetcher(0, &calls),
        QueryOptions::default(),
    );
    assert_eq!(next.data(), Some(31));
    assert!(!next.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

//! Mutation outcomes and the invalidations they push into mounted queries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::timeout;

use scorta::binding::{Fetcher, MutationBinding, QueryBinding, QueryOptions, fetcher};
use scorta::cache::{QueryClient, QueryError, QueryKey};

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
async fn a_successful_mutation_reports_through_the_snapshot() {
    let binding = MutationBinding::new(|delta: i64| async move { Ok::<i64, QueryError>(delta * 2) });

    let value = binding.mutate_async(21).await.expect("mutation succeeds");
    assert_eq!(value, 42);

    let snapshot = binding.snapshot();
    assert!(snapshot.is_success);
    assert!(!snapshot.is_pending);
    assert!(!snapshot.is_error());
}

#[tokio::test]
async fn a_rejected_mutation_surfaces_once_through_every_channel() {
    let failures = Arc::new(AtomicUsize::new(0));
    let binding = MutationBinding::new(|_: i64| async move {
        Err::<i64, QueryError>(QueryError::mutation("insufficient stock"))
    })
    .on_error({
        let failures = Arc::clone(&failures);
        move |error, variables| {
            assert_eq!(error.message(), "insufficient stock");
            assert_eq!(*variables, 3);
            failures.fetch_add(1, Ordering::SeqCst);
        }
    });

    let err = binding.mutate_async(3).await.expect_err("mutation fails");
    assert_eq!(err, QueryError::mutation("insufficient stock"));

    assert!(binding.is_error());
    assert!(!binding.is_success());
    assert!(!binding.is_pending());
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn success_callbacks_refresh_mounted_queries() {
    let client = QueryClient::new();
    let key = QueryKey::from("stock").with(5);
    client.set_query_data(&key, 10i64);

    let calls = Arc::new(AtomicUsize::new(0));
    let stock = QueryBinding::mount(
        &client,
        key.clone(),
        counting_fetcher(8, &calls),
        QueryOptions::default(),
    );
    assert_eq!(stock.data(), Some(10));

    let mutation = {
        let client = client.clone();
        let key = key.clone();
        MutationBinding::new(|delta: i64| async move { Ok::<i64, QueryError>(delta) })
            .on_success(move |_value, _variables| client.invalidate_queries(&key))
    };
    mutation.mutate_async(-2).await.expect("mutation succeeds");

    wait_until(&stock, |binding| binding.data() == Some(8)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.get_query_data::<i64>(&key), Some(8));
}

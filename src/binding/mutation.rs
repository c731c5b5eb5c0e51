//! Mutation binding.
//!
//! Imperative write wrapper: runs a mutation function, tracks
//! pending/success/error across invocations, and invokes optional
//! success/error callbacks. The binding itself never touches the cache;
//! invalidation belongs to the caller's `on_success`.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::histogram;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::warn;

use crate::cache::QueryError;
use crate::cache::lock::mutex_lock;

const SOURCE: &str = "binding::mutation";

const METRIC_MUTATION_MS: &str = "scorta_mutation_ms";

type MutationFn<V, T> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;
type SuccessCallback<V, T> = Arc<dyn Fn(&T, &V) + Send + Sync>;
type ErrorCallback<V> = Arc<dyn Fn(&QueryError, &V) + Send + Sync>;

/// Point-in-time view of a mutation binding's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSnapshot {
    pub is_pending: bool,
    pub is_success: bool,
    pub error: Option<QueryError>,
}

impl MutationSnapshot {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

struct MutationState {
    is_pending: bool,
    is_success: bool,
    error: Option<QueryError>,
}

struct MutationShared {
    state: Mutex<MutationState>,
    changed: watch::Sender<u64>,
    handle: Handle,
}

impl MutationShared {
    fn bump(&self) {
        self.changed.send_modify(|version| *version += 1);
    }
}

/// Binding for one imperative write operation.
///
/// Every invocation resets the state to pending before running; there is
/// no overlap guard, the latest invocation's outcome wins.
pub struct MutationBinding<V, T> {
    mutation_fn: MutationFn<V, T>,
    on_success: Option<SuccessCallback<V, T>>,
    on_error: Option<ErrorCallback<V>>,
    shared: Arc<MutationShared>,
}

impl<V, T> MutationBinding<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Wrap `mutation_fn`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        Self {
            mutation_fn: Arc::new(move |variables| mutation_fn(variables).boxed()),
            on_success: None,
            on_error: None,
            shared: Arc::new(MutationShared {
                state: Mutex::new(MutationState {
                    is_pending: false,
                    is_success: false,
                    error: None,
                }),
                changed: watch::channel(0u64).0,
                handle: Handle::current(),
            }),
        }
    }

    /// Callback invoked with the result and the variables after a
    /// successful mutation, before `is_pending` clears. Cache invalidation
    /// lives here.
    pub fn on_success(mut self, callback: impl Fn(&T, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Callback invoked with the normalized error and the variables after
    /// a failed mutation.
    pub fn on_error(mut self, callback: impl Fn(&QueryError, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Fire-and-forget form: runs the mutation on the captured runtime;
    /// failures are observable through the binding state and `on_error`
    /// only.
    pub fn mutate(&self, variables: V) {
        let mutation_fn = Arc::clone(&self.mutation_fn);
        let on_success = self.on_success.clone();
        let on_error = self.on_error.clone();
        let shared = Arc::clone(&self.shared);
        self.shared.handle.spawn(async move {
            let _ = execute(
                &shared,
                &mutation_fn,
                on_success.as_ref(),
                on_error.as_ref(),
                variables,
            )
            .await;
        });
    }

    /// Awaitable form: same execution path, rethrowing the normalized
    /// error to the caller.
    pub async fn mutate_async(&self, variables: V) -> Result<T, QueryError> {
        execute(
            &self.shared,
            &self.mutation_fn,
            self.on_success.as_ref(),
            self.on_error.as_ref(),
            variables,
        )
        .await
    }

    pub fn snapshot(&self) -> MutationSnapshot {
        let state = mutex_lock(&self.shared.state, SOURCE, "snapshot");
        MutationSnapshot {
            is_pending: state.is_pending,
            is_success: state.is_success,
            error: state.error.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "is_pending").is_pending
    }

    pub fn is_success(&self) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "is_success").is_success
    }

    pub fn error(&self) -> Option<QueryError> {
        mutex_lock(&self.shared.state, SOURCE, "error").error.clone()
    }

    pub fn is_error(&self) -> bool {
        mutex_lock(&self.shared.state, SOURCE, "is_error").error.is_some()
    }

    /// Version channel bumped on every state transition.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changed.subscribe()
    }
}

async fn execute<V, T>(
    shared: &Arc<MutationShared>,
    mutation_fn: &MutationFn<V, T>,
    on_success: Option<&SuccessCallback<V, T>>,
    on_error: Option<&ErrorCallback<V>>,
    variables: V,
) -> Result<T, QueryError>
where
    V: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    {
        let mut state = mutex_lock(&shared.state, SOURCE, "begin_mutation");
        state.is_pending = true;
        state.is_success = false;
        state.error = None;
    }
    shared.bump();

    let started_at = Instant::now();
    match mutation_fn(variables.clone()).await {
        Ok(value) => {
            histogram!(METRIC_MUTATION_MS, "outcome" => "ok")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            if let Some(callback) = on_success {
                callback(&value, &variables);
            }
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "apply_mutation_success");
                state.is_pending = false;
                state.is_success = true;
            }
            shared.bump();
            Ok(value)
        }
        Err(err) => {
            histogram!(METRIC_MUTATION_MS, "outcome" => "error")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            warn!(error = %err, "Mutation failed");
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "record_mutation_error");
                state.error = Some(err.clone());
            }
            shared.bump();
            if let Some(callback) = on_error {
                callback(&err, &variables);
            }
            {
                let mut state = mutex_lock(&shared.state, SOURCE, "apply_mutation_failure");
                state.is_pending = false;
                state.is_success = false;
            }
            shared.bump();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    async fn wait_for<V, T, P>(binding: &MutationBinding<V, T>, pred: P)
    where
        V: Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        P: Fn(&MutationSnapshot) -> bool,
    {
        let mut changes = binding.changes();
        timeout(Duration::from_secs(1), async {
            loop {
                if pred(&binding.snapshot()) {
                    return;
                }
                changes.changed().await.expect("binding alive");
            }
        })
        .await
        .expect("expected state before timeout");
    }

    #[tokio::test]
    async fn mutate_async_resolves_and_reports_success() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callback_seen = Arc::clone(&seen);
        let binding = MutationBinding::new(|delta: i64| async move { Ok(delta * 2) })
            .on_success(move |result: &i64, variables: &i64| {
                callback_seen
                    .lock()
                    .expect("seen lock")
                    .push((*result, *variables));
            });

        let result = binding.mutate_async(21).await;

        assert_eq!(result, Ok(42));
        let snapshot = binding.snapshot();
        assert!(snapshot.is_success);
        assert!(!snapshot.is_pending);
        assert!(snapshot.error.is_none());
        assert_eq!(seen.lock().expect("seen lock").as_slice(), &[(42, 21)]);
    }

    #[tokio::test]
    async fn mutate_async_rejection_surfaces_and_flags_error() {
        let errors = Arc::new(AtomicUsize::new(0));
        let callback_errors = Arc::clone(&errors);
        let binding =
            MutationBinding::new(|_: i64| async move { Err::<i64, _>(QueryError::mutation("api down")) })
                .on_error(move |_error, _variables| {
                    callback_errors.fetch_add(1, Ordering::SeqCst);
                });

        let result = binding.mutate_async(1).await;

        assert_eq!(result, Err(QueryError::mutation("api down")));
        let snapshot = binding.snapshot();
        assert!(snapshot.is_error());
        assert!(!snapshot.is_success);
        assert!(!snapshot.is_pending);
        assert_eq!(snapshot.error, Some(QueryError::mutation("api down")));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_invocation_resets_previous_outcome() {
        let binding = MutationBinding::new(|fail: bool| async move {
            if fail {
                Err(QueryError::mutation("rejected"))
            } else {
                Ok(7i64)
            }
        });

        let _ = binding.mutate_async(true).await;
        assert!(binding.is_error());

        let result = binding.mutate_async(false).await;
        assert_eq!(result, Ok(7));
        let snapshot = binding.snapshot();
        assert!(snapshot.is_success);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn fire_and_forget_applies_state_without_rethrowing() {
        let binding =
            MutationBinding::new(|_: ()| async move { Err::<i64, _>(QueryError::mutation("boom")) });

        binding.mutate(());
        wait_for(&binding, |s| s.is_error() && !s.is_pending).await;
        assert!(!binding.is_success());
    }

    #[tokio::test]
    async fn success_callback_runs_while_still_pending() {
        let slot: Arc<OnceLock<Arc<MutationBinding<(), i64>>>> = Arc::new(OnceLock::new());
        let observed = Arc::new(Mutex::new(None));

        let callback_slot = Arc::clone(&slot);
        let callback_observed = Arc::clone(&observed);
        let binding = Arc::new(
            MutationBinding::new(|_: ()| async move { Ok(1i64) }).on_success(move |_, _| {
                if let Some(binding) = callback_slot.get() {
                    *callback_observed.lock().expect("observed lock") =
                        Some(binding.is_pending());
                }
            }),
        );
        slot.set(Arc::clone(&binding)).ok().expect("slot unset");

        let _ = binding.mutate_async(()).await;

        assert_eq!(*observed.lock().expect("observed lock"), Some(true));
        assert!(binding.is_success());
        assert!(!binding.is_pending());
    }
}

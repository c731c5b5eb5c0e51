//! Ambient query client scope.
//!
//! The [`QueryClient`] is an explicit value, not a process global. Code that
//! wants an ambient instance (facades, view-model glue) enters a scope with
//! [`with_client`] / [`with_client_sync`] and reads it back with [`current`].
//! Scopes nest; each task sees the innermost provisioned client.

use std::future::Future;

use thiserror::Error;
use tracing::error;

use super::store::QueryClient;

tokio::task_local! {
    static CURRENT_CLIENT: QueryClient;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No client was provisioned for the current scope.
    #[error("no query client provided in the current scope")]
    NotProvided,
}

/// Run `fut` with `client` as the ambient query client.
pub async fn with_client<F>(client: QueryClient, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CLIENT.scope(client, fut).await
}

/// Synchronous form of [`with_client`].
pub fn with_client_sync<F, R>(client: QueryClient, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_CLIENT.sync_scope(client, f)
}

/// The ambient client for the current scope.
///
/// # Panics
///
/// Panics when no scope provisioned a client. Reaching for the cache
/// without wiring one up is a programming error surfaced at the first
/// access rather than as silently divergent caches.
pub fn current() -> QueryClient {
    match try_current() {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "Query client context missing");
            panic!("no ambient QueryClient; wrap the call in context::with_client");
        }
    }
}

/// Non-panicking probe for the ambient client.
pub fn try_current() -> Result<QueryClient, ContextError> {
    CURRENT_CLIENT
        .try_with(QueryClient::clone)
        .map_err(|_| ContextError::NotProvided)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::QueryKey;

    fn scope_key() -> QueryKey {
        QueryKey::from("scope")
    }

    #[test]
    fn sync_scope_provides_the_client() {
        let client = QueryClient::new();
        client.set_query_data(&scope_key(), 1i64);

        let seen = with_client_sync(client, || {
            current().get_query_data::<i64>(&scope_key())
        });

        assert_eq!(seen, Some(1));
    }

    #[test]
    fn nested_scopes_shadow_and_restore() {
        let outer = QueryClient::new();
        let inner = QueryClient::new();
        outer.set_query_data(&scope_key(), 1i64);
        inner.set_query_data(&scope_key(), 2i64);

        with_client_sync(outer, || {
            assert_eq!(current().get_query_data::<i64>(&scope_key()), Some(1));
            with_client_sync(inner, || {
                assert_eq!(current().get_query_data::<i64>(&scope_key()), Some(2));
            });
            assert_eq!(current().get_query_data::<i64>(&scope_key()), Some(1));
        });
    }

    #[tokio::test]
    async fn async_scope_ends_with_the_future() {
        let client = QueryClient::new();
        client.set_query_data(&scope_key(), 7i64);

        let seen = with_client(client, async {
            current().get_query_data::<i64>(&scope_key())
        })
        .await;

        assert_eq!(seen, Some(7));
        assert!(matches!(try_current(), Err(ContextError::NotProvided)));
    }

    #[test]
    fn try_current_reports_missing_scope() {
        assert!(matches!(try_current(), Err(ContextError::NotProvided)));
    }

    #[test]
    #[should_panic(expected = "no ambient QueryClient")]
    fn current_panics_outside_a_scope() {
        let _ = current();
    }
}

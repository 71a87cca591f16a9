//! Single-flight token refresh.
//!
//! Requests that see a 401 all funnel through [`RefreshGate::refresh`]. The
//! first one starts the refresh on a spawned task and parks the task's
//! outcome in a shared future; everyone arriving while it runs awaits that
//! same future. Cancelling a waiter never cancels the refresh itself.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{Credentials, TokenStore, UisError};

pub(crate) type RefreshOutcome = std::result::Result<Credentials, UisError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
pub(crate) struct RefreshGate {
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl RefreshGate {
    /// Returns credentials newer than `stale`, refreshing at most once.
    ///
    /// `stale` is the access token the server just rejected. If the store
    /// already holds a different token, another request refreshed first and
    /// that token is returned without a network call. `start` is only
    /// invoked when no refresh is running; it must persist the new pair
    /// before resolving.
    pub(crate) async fn refresh<F, Fut>(
        &self,
        store: &dyn TokenStore,
        stale: &str,
        start: F,
    ) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let shared = {
            let mut slot = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let current = store.load()?;
            if current.is_authenticated() && current.access_token != stale {
                return Ok(current);
            }

            match slot.as_ref().filter(|running| running.peek().is_none()) {
                Some(running) => running.clone(),
                None => {
                    let handle = tokio::spawn(start());
                    let refresh = async move {
                        handle.await.unwrap_or_else(|err| {
                            Err(UisError::Refresh(format!("refresh task failed: {err}")))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        shared.await
    }
}

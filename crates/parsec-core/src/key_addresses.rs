//! Trusted service key addresses.
//!
//! The session only trusts TSK grants signed by one of these addresses. The
//! list is fetched lazily by a caller-supplied function and cached as a
//! shared future; [`KeyAddressProvider::refresh`] asks the next fetch to
//! bypass whatever cache the function itself keeps.

use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parsec_crypto::KeyAddress;

type Addresses = Shared<BoxFuture<'static, Result<Arc<[KeyAddress]>, String>>>;

type Fetch = dyn Fn(bool) -> BoxFuture<'static, Result<Vec<KeyAddress>, String>> + Send + Sync;

/// Lazily fetched, cached list of trusted service key addresses.
///
/// Clones share the cache.
#[derive(Clone)]
pub struct KeyAddressProvider {
    fetch: Arc<Fetch>,
    state: Arc<Mutex<ProviderState>>,
}

struct ProviderState {
    cached: Option<Addresses>,
    /// Passed to the next fetch, then reset
    force_refresh: bool,
}

impl KeyAddressProvider {
    /// Provider backed by `fetch(force_refresh)`.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<KeyAddress>, String>> + Send + 'static,
    {
        Self {
            fetch: Arc::new(move |force_refresh| fetch(force_refresh).boxed()),
            state: Arc::new(Mutex::new(ProviderState { cached: None, force_refresh: false })),
        }
    }

    /// Provider for a fixed, known list.
    pub fn fixed(addresses: Vec<KeyAddress>) -> Self {
        Self::new(move |_| futures::future::ready(Ok(addresses.clone())))
    }

    /// Current trusted addresses.
    ///
    /// Returns the cached fetch if there is one, otherwise starts a fetch.
    /// A cached fetch that failed is discarded and retried.
    ///
    /// # Errors
    ///
    /// Returns the fetch function's error.
    pub async fn value(&self) -> Result<Arc<[KeyAddress]>, String> {
        self.addresses().await
    }

    /// Drop the cached list and make the next fetch a forced refresh.
    #[allow(clippy::expect_used)]
    pub fn refresh(&self) {
        let mut state = self.state.lock().expect("Mutex poisoned");
        state.cached = None;
        state.force_refresh = true;
    }

    #[allow(clippy::expect_used)]
    fn addresses(&self) -> Addresses {
        let mut state = self.state.lock().expect("Mutex poisoned");
        if let Some(cached) = state.cached.as_ref()
            && !matches!(cached.peek(), Some(Err(_)))
        {
            return cached.clone();
        }

        let force_refresh = std::mem::take(&mut state.force_refresh);
        let fetch = (self.fetch)(force_refresh);
        let addresses = async move { fetch.await.map(Arc::<[KeyAddress]>::from) }.boxed().shared();
        state.cached = Some(addresses.clone());
        addresses
    }
}

impl std::fmt::Debug for KeyAddressProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAddressProvider").finish_non_exhaustive()
    }
}

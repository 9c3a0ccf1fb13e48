//! Single, version-tagged slot holding the current endpoint future.
//!
//! ```text
//!   callers ──clone──► (generation, Shared<endpoint future>)
//!                            │ failed
//!                            ▼
//!   replace_if(generation) ── matches ──► start new future, generation + 1
//!                          └─ stale ────► return the already replaced one
//! ```
//!
//! The mutex is only held to swap or clone the handle, never across an
//! await.

use std::sync::{Arc, Mutex};

use futures::{
    FutureExt,
    future::{AbortHandle, Abortable, BoxFuture, Shared},
};

use crate::{endpoint::Endpoint, error::SessionError};

/// Negotiation outcome shared by every caller.
pub type EndpointFuture<C, E> =
    Shared<BoxFuture<'static, Result<Arc<Endpoint<C, E>>, SessionError>>>;

type Negotiation<C, E> = BoxFuture<'static, Result<Arc<Endpoint<C, E>>, SessionError>>;

/// Snapshot of the slot.
pub(crate) struct Current<C, E> {
    pub(crate) generation: u64,
    pub(crate) endpoint: EndpointFuture<C, E>,
}

struct EndpointSlot<C, E> {
    generation: u64,
    endpoint: EndpointFuture<C, E>,
    abort: AbortHandle,
}

pub(crate) struct Slot<C, E> {
    inner: Mutex<EndpointSlot<C, E>>,
}

impl<C, E> Slot<C, E>
where
    C: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new(negotiation: Negotiation<C, E>) -> Self {
        Self { inner: Mutex::new(start(0, negotiation)) }
    }

    #[allow(clippy::expect_used)]
    pub(crate) fn current(&self) -> Current<C, E> {
        let slot = self.inner.lock().expect("Mutex poisoned");
        Current { generation: slot.generation, endpoint: slot.endpoint.clone() }
    }

    /// Start `begin()` only if the slot still holds generation `expected`.
    ///
    /// Returns whichever future is current afterwards.
    #[allow(clippy::expect_used)]
    pub(crate) fn replace_if(
        &self,
        expected: u64,
        begin: impl FnOnce() -> Negotiation<C, E>,
    ) -> Current<C, E> {
        let mut slot = self.inner.lock().expect("Mutex poisoned");
        if slot.generation == expected {
            *slot = start(slot.generation + 1, begin());
        }
        Current { generation: slot.generation, endpoint: slot.endpoint.clone() }
    }

    /// Start `begin()` regardless of what the slot holds.
    #[allow(clippy::expect_used)]
    pub(crate) fn replace(&self, begin: impl FnOnce() -> Negotiation<C, E>) -> Current<C, E> {
        let mut slot = self.inner.lock().expect("Mutex poisoned");
        *slot = start(slot.generation + 1, begin());
        Current { generation: slot.generation, endpoint: slot.endpoint.clone() }
    }

    /// Abort the current negotiation. Awaiting callers observe `Cancelled`.
    #[allow(clippy::expect_used)]
    pub(crate) fn cancel(&self) {
        self.inner.lock().expect("Mutex poisoned").abort.abort();
    }
}

impl<C, E> Drop for Slot<C, E> {
    fn drop(&mut self) {
        if let Ok(slot) = self.inner.get_mut() {
            slot.abort.abort();
        }
    }
}

fn start<C, E>(generation: u64, negotiation: Negotiation<C, E>) -> EndpointSlot<C, E>
where
    C: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let (abort, registration) = AbortHandle::new_pair();
    let endpoint = Abortable::new(negotiation, registration)
        .map(|outcome| outcome.unwrap_or(Err(SessionError::Cancelled)))
        .boxed()
        .shared();

    // Drive the negotiation even if nobody awaits it yet.
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        let driver = endpoint.clone();
        runtime.spawn(async move {
            let _ = driver.await;
        });
    }

    EndpointSlot { generation, endpoint, abort }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future;
    use parsec_crypto::SymmetricKey;

    use super::*;
    use crate::{rpc::Connection, system_env::SystemEnv};

    struct Unused;

    #[async_trait::async_trait]
    impl Connection for Unused {
        async fn call(
            &self,
            _method: &str,
            _params: crate::rpc::Value,
        ) -> Result<crate::rpc::Value, crate::rpc::CallError> {
            Err(crate::rpc::CallError::Transport("unused".into()))
        }
    }

    type TestSlot = Slot<Unused, SystemEnv>;

    fn ready(started: &Arc<AtomicUsize>) -> Negotiation<Unused, SystemEnv> {
        started.fetch_add(1, Ordering::SeqCst);
        let endpoint =
            Endpoint::new(Arc::new(Unused), SymmetricKey::new([0; 32]), "sid".into(), SystemEnv);
        future::ready(Ok(Arc::new(endpoint))).boxed()
    }

    #[tokio::test]
    async fn stale_generation_does_not_replace() {
        let started = Arc::new(AtomicUsize::new(0));
        let slot = TestSlot::new(ready(&started));
        let first = slot.current();

        let a = slot.replace_if(first.generation, || ready(&started));
        let b = slot.replace_if(first.generation, || ready(&started));

        assert_eq!(a.generation, 1);
        assert_eq!(b.generation, 1);
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert!(b.endpoint.await.is_ok());
    }

    #[tokio::test]
    async fn replace_always_advances() {
        let started = Arc::new(AtomicUsize::new(0));
        let slot = TestSlot::new(ready(&started));
        slot.replace(|| ready(&started));
        assert_eq!(slot.replace(|| ready(&started)).generation, 2);
    }

    #[tokio::test]
    async fn cancel_resolves_waiters() {
        let slot = TestSlot::new(future::pending().boxed());
        let waiting = slot.current().endpoint;

        slot.cancel();
        assert_eq!(waiting.await.unwrap_err(), SessionError::Cancelled);
    }
}

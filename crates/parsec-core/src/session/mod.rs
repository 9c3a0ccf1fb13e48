//! Parsec session: lazily established, self-healing authenticated channel.
//!
//! A session owns exactly one current endpoint future. Construction starts
//! the first negotiation; every [`Session::call`] awaits the same future, so
//! concurrent callers never negotiate twice.
//!
//! ```text
//!  call() ──► current endpoint ──► cmd ──► result
//!                 │ pending: shared by all callers
//!                 │ failed:  restarted once (compare-and-swap)
//!                 ▼
//!  session key rejected ──► refresh TSK (compare-and-swap) ──► retry once
//! ```
//!
//! Recovery is driven by structured error codes only. Transport failures are
//! returned to the caller and never cause keys to be regenerated.

mod config;
mod credentials;
mod slot;
mod state;

use std::sync::Arc;

use futures::{FutureExt, future};

pub use self::{
    config::{
        DEFAULT_KEY_STRENGTH, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_REGISTRATION_ATTEMPTS,
        DEFAULT_MAX_TSK_ROUNDS, DEFAULT_REGISTRATION_BACKOFF, DEFAULT_TRUST_ATTEMPTS,
        SessionConfig,
    },
    credentials::{SCK_SLOT, SESSION_ID_SLOT, TSK_SLOT},
    slot::EndpointFuture,
};
use self::{
    slot::{Current, Slot},
    state::{Begin, Negotiator},
};
use crate::{
    endpoint::Endpoint,
    env::Environment,
    error::SessionError,
    key_addresses::KeyAddressProvider,
    protocol::DESTROY_SESSION,
    rpc::{CallError, Connection, Value, empty_map},
    storage::SessionStorage,
};

/// Client side of a Parsec session.
///
/// Dropping the session aborts a negotiation still in flight.
pub struct Session<C, S, E> {
    negotiator: Arc<Negotiator<C, S, E>>,
    slot: Slot<C, E>,
}

impl<C, S, E> Session<C, S, E>
where
    C: Connection,
    S: SessionStorage,
    E: Environment,
{
    /// Session persisted in `storage`, talking to the service over
    /// `connection`.
    ///
    /// Establishment starts immediately. Inside a Tokio runtime it runs on a
    /// spawned task, otherwise on the first await of the endpoint.
    pub fn new(
        storage: S,
        connection: Arc<C>,
        addresses: KeyAddressProvider,
        env: E,
        config: SessionConfig,
    ) -> Self {
        let negotiator = Arc::new(Negotiator::new(storage, connection, addresses, env, config));
        let slot = Slot::new(Arc::clone(&negotiator).negotiate(Begin::Resume).boxed());
        Self { negotiator, slot }
    }

    /// Execute `method` through the session endpoint.
    ///
    /// A rejected session key is refreshed and the call retried once.
    ///
    /// # Errors
    ///
    /// - `Remote` if the service rejects the command
    /// - `Transport` if the service cannot be reached
    /// - Any error that ended the negotiation
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        let (generation, endpoint) = self.connected().await;

        match endpoint?.call(method, params.clone()).await {
            Err(CallError::Remote(error)) if error.code.is_session_key_failure() => {
                tracing::warn!(method, code = %error.code, "session key rejected, refreshing");
                let current = self.slot.replace_if(generation, || self.begin(Begin::RefreshTsk));
                let endpoint = current.endpoint.await?;
                Ok(endpoint.call(method, params).await?)
            },
            result => Ok(result?),
        }
    }

    /// Current endpoint, once negotiated.
    pub async fn endpoint(&self) -> Result<Arc<Endpoint<C, E>>, SessionError> {
        self.connected().await.1
    }

    /// Session id of the current endpoint.
    pub async fn id(&self) -> Result<String, SessionError> {
        Ok(self.endpoint().await?.session_id().to_string())
    }

    /// Drop the TSK and negotiate a new one.
    ///
    /// Returns once the new endpoint is ready.
    pub async fn refresh_session_key(&self) -> Result<(), SessionError> {
        self.slot.replace(|| self.begin(Begin::RefreshTsk)).endpoint.await?;
        Ok(())
    }

    /// [`kill`](Self::kill) the session, then establish a new one.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.kill().await?;
        self.slot.replace(|| self.begin(Begin::Resume)).endpoint.await?;
        Ok(())
    }

    /// Ask the service to destroy the session, then forget every persisted
    /// credential and reset the counters.
    ///
    /// The destroyed endpoint is dropped: the next call negotiates a new
    /// session from scratch.
    ///
    /// Returns whether the service confirmed the deletion. Local state is
    /// cleared either way.
    pub async fn kill(&self) -> Result<bool, SessionError> {
        let destroyed = match self.slot.current().endpoint.await {
            Ok(endpoint) => match endpoint.call(DESTROY_SESSION, empty_map()).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("destroySession failed: {}", e);
                    false
                },
            },
            Err(e) => {
                tracing::debug!(error = %e, "no endpoint to destroy");
                false
            },
        };

        self.negotiator.forget().await?;
        // Completed before returning so the next call restarts it.
        let killed = self.slot.replace(|| future::ready(Err(SessionError::Killed)).boxed());
        let _ = killed.endpoint.await;
        Ok(destroyed)
    }

    /// Abort the negotiation in flight.
    ///
    /// Callers awaiting it observe [`SessionError::Cancelled`], as do later
    /// calls until [`refresh_session_key`](Self::refresh_session_key) or
    /// [`reset`](Self::reset).
    pub fn cancel(&self) {
        self.slot.cancel();
    }

    /// Advisory TSK expiry (unix seconds) last reported by the service.
    pub fn expires_at(&self) -> Option<u64> {
        self.negotiator.expires_at()
    }

    /// Successful SCK registrations since construction or the last kill.
    pub fn sck_registrations(&self) -> u32 {
        self.negotiator.sck_registrations()
    }

    /// Trusted TSK grants since construction or the last kill.
    pub fn tsk_creations(&self) -> u32 {
        self.negotiator.tsk_creations()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        self.negotiator.config()
    }

    /// Await the current endpoint, first restarting a negotiation that
    /// already failed.
    async fn connected(&self) -> (u64, Result<Arc<Endpoint<C, E>>, SessionError>) {
        let mut current = self.slot.current();
        let failed = match current.endpoint.peek() {
            Some(Err(error)) if *error != SessionError::Cancelled => {
                tracing::debug!(%error, "previous negotiation failed, starting over");
                true
            },
            _ => false,
        };
        if failed {
            current = self.slot.replace_if(current.generation, || self.begin(Begin::Resume));
        }
        let Current { generation, endpoint } = current;
        (generation, endpoint.await)
    }

    fn begin(
        &self,
        begin: Begin,
    ) -> futures::future::BoxFuture<'static, Result<Arc<Endpoint<C, E>>, SessionError>> {
        Arc::clone(&self.negotiator).negotiate(begin).boxed()
    }
}

impl<C, S, E> std::fmt::Debug for Session<C, S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

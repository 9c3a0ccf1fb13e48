//! Connection establishment as an explicit phase machine.
//!
//! ```text
//! ResumeTsk    ── verified ────────────────────────► Connected
//!              ── no TSK / rejected ───────────────► StartSession
//! StartSession ── SCK cached ──────────────────────► MintTsk
//!              ── no SCK ──────────────────────────► RegisterSck
//! MintTsk      ── trusted grant ───────────────────► ResumeTsk
//!              ── unknown signer, budget left ─────► MintTsk
//!              ── SCK refused / budget spent ──────► RegisterSck
//! RegisterSck  ── registered ──────────────────────► StartSession
//!              ── rejected, attempts left ─────────► RegisterSck
//! ```
//!
//! Transport failures end the negotiation in every phase. So do a nonce
//! mismatch, an exhausted registration budget and more `createTSK` rounds
//! than [`SessionConfig::max_tsk_rounds`] in one negotiation.
//!
//! A spent trust budget discards the SCK at most once per negotiation. The
//! replacement starts over with a fresh round count; if its grant is still
//! signed by an unknown key the negotiation fails.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use parsec_crypto::{NONCE_SIZE, PrivateKey, SignedRecord, SymmetricKey};

use super::{config::SessionConfig, credentials::Credentials};
use crate::{
    endpoint::Endpoint,
    env::Environment,
    error::SessionError,
    key_addresses::KeyAddressProvider,
    pow::{self, PowSolution, PowTask},
    protocol::{
        CREATE_TSK, CreateTskGrant, CreateTskParams, CreateTskReply, CreateTskRequest,
        GET_SESSION_INFO, PowResultPayload, REGISTER_SCK, REQUEST_SCK, RegisterSckParams,
        RegisterSckReply, RequestSckParams, RequestSckReply, SessionInfo, TskGrant,
    },
    rpc::{CallError, Connection, empty_map, from_bytes, from_value, to_bytes, to_value},
    storage::SessionStorage,
};

/// Size of the `createTSK` client nonce.
const CLIENT_NONCE_SIZE: usize = 32;

/// Negotiation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Verify a cached TSK and SessionId
    ResumeTsk,
    /// Pick between minting a TSK and registering an SCK
    StartSession,
    /// Exchange the SCK for a TSK
    MintTsk,
    /// Register a new SCK
    RegisterSck,
}

/// How a negotiation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Begin {
    /// Reuse whatever is persisted
    Resume,
    /// Drop the TSK first
    RefreshTsk,
}

enum Step<C, E> {
    Next(Phase),
    Done(Arc<Endpoint<C, E>>),
}

/// Per-negotiation limits.
#[derive(Debug, Default)]
struct Rounds {
    /// `createTSK` rounds with the current SCK
    tsk: u32,
    /// SCK already discarded for an unconfirmed service identity
    escalated: bool,
}

/// Owns the persisted credentials and runs negotiations one at a time.
pub(crate) struct Negotiator<C, S, E> {
    connection: Arc<C>,
    addresses: KeyAddressProvider,
    env: E,
    config: SessionConfig,
    credentials: tokio::sync::Mutex<Credentials<S>>,
    sck_registrations: AtomicU32,
    tsk_creations: AtomicU32,
    /// `createTSK` attempts over the session lifetime
    trust_attempts: AtomicU32,
    expires_at: Mutex<Option<u64>>,
}

impl<C, S, E> Negotiator<C, S, E>
where
    C: Connection,
    S: SessionStorage,
    E: Environment,
{
    pub(crate) fn new(
        storage: S,
        connection: Arc<C>,
        addresses: KeyAddressProvider,
        env: E,
        config: SessionConfig,
    ) -> Self {
        Self {
            connection,
            addresses,
            env,
            config,
            credentials: tokio::sync::Mutex::new(Credentials::new(storage)),
            sck_registrations: AtomicU32::new(0),
            tsk_creations: AtomicU32::new(0),
            trust_attempts: AtomicU32::new(0),
            expires_at: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn sck_registrations(&self) -> u32 {
        self.sck_registrations.load(Ordering::SeqCst)
    }

    pub(crate) fn tsk_creations(&self) -> u32 {
        self.tsk_creations.load(Ordering::SeqCst)
    }

    #[allow(clippy::expect_used)]
    pub(crate) fn expires_at(&self) -> Option<u64> {
        *self.expires_at.lock().expect("Mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn set_expires_at(&self, expires_at: Option<u64>) {
        *self.expires_at.lock().expect("Mutex poisoned") = expires_at;
    }

    /// Clear every persisted credential and reset the counters.
    ///
    /// Waits for a running negotiation to finish first.
    pub(crate) async fn forget(&self) -> Result<(), SessionError> {
        let mut credentials = self.credentials.lock().await;
        credentials.clear_all().await?;
        self.sck_registrations.store(0, Ordering::SeqCst);
        self.tsk_creations.store(0, Ordering::SeqCst);
        self.trust_attempts.store(0, Ordering::SeqCst);
        self.set_expires_at(None);
        Ok(())
    }

    /// Run one negotiation to a verified endpoint.
    pub(crate) async fn negotiate(
        self: Arc<Self>,
        begin: Begin,
    ) -> Result<Arc<Endpoint<C, E>>, SessionError> {
        let mut credentials = self.credentials.lock().await;
        let started = self.env.now();
        if begin == Begin::RefreshTsk {
            credentials.set_tsk(None)?;
        }

        let mut rounds = Rounds::default();
        let mut phase = Phase::ResumeTsk;
        loop {
            tracing::debug!(?phase, "session negotiation");
            let step = match phase {
                Phase::ResumeTsk => self.resume_tsk(&mut credentials).await?,
                Phase::StartSession => self.start_session(&mut credentials).await?,
                Phase::MintTsk => self.mint_tsk(&mut credentials, &mut rounds).await?,
                Phase::RegisterSck => self.register_sck(&mut credentials).await?,
            };
            match step {
                Step::Next(next) => phase = next,
                Step::Done(endpoint) => {
                    tracing::debug!(
                        session_id = endpoint.session_id(),
                        elapsed = ?(self.env.now() - started),
                        "session established"
                    );
                    return Ok(endpoint);
                },
            }
        }
    }

    async fn resume_tsk(&self, credentials: &mut Credentials<S>) -> Result<Step<C, E>, SessionError> {
        let Some(tsk) = credentials.tsk()? else {
            return Ok(Step::Next(Phase::StartSession));
        };
        let Some(session_id) = credentials.session_id()? else {
            tracing::warn!("cached TSK has no session id, dropping it");
            credentials.set_tsk(None)?;
            return Ok(Step::Next(Phase::StartSession));
        };

        let endpoint = Endpoint::new(Arc::clone(&self.connection), tsk, session_id, self.env.clone());
        match endpoint.call(GET_SESSION_INFO, empty_map()).await {
            Ok(reply) => {
                let info: SessionInfo = from_value(&reply)?;
                self.set_expires_at(Some(info.expires_at));
                Ok(Step::Done(Arc::new(endpoint)))
            },
            Err(CallError::Remote(error)) => {
                tracing::warn!(code = %error.code, "cached TSK rejected: {}", error.text);
                credentials.set_tsk(None)?;
                Ok(Step::Next(Phase::StartSession))
            },
            Err(CallError::Authentication(reason)) => {
                tracing::warn!(%reason, "cached TSK does not open replies");
                credentials.set_tsk(None)?;
                Ok(Step::Next(Phase::StartSession))
            },
            Err(error) => Err(error.into()),
        }
    }

    async fn start_session(
        &self,
        credentials: &mut Credentials<S>,
    ) -> Result<Step<C, E>, SessionError> {
        if credentials.sck().await?.is_some() {
            Ok(Step::Next(Phase::MintTsk))
        } else {
            Ok(Step::Next(Phase::RegisterSck))
        }
    }

    async fn mint_tsk(
        &self,
        credentials: &mut Credentials<S>,
        rounds: &mut Rounds,
    ) -> Result<Step<C, E>, SessionError> {
        if rounds.tsk >= self.config.max_tsk_rounds {
            return Err(SessionError::ProvisioningFailed {
                attempts: rounds.tsk,
                reason: "no usable session key after repeated createTSK rounds".to_string(),
            });
        }
        rounds.tsk += 1;

        let Some(sck) = credentials.sck().await? else {
            return Ok(Step::Next(Phase::RegisterSck));
        };
        let trusted = self.addresses.value().await.map_err(SessionError::AddressProvider)?;

        let client_nonce: [u8; CLIENT_NONCE_SIZE] = self.env.random_array();
        let request = CreateTskRequest {
            client_nonce: client_nonce.to_vec(),
            session_id: credentials.session_id()?,
            service_key_addresses: trusted.to_vec(),
        };
        let signed_record = SignedRecord::pack_with_key(&sck, &to_bytes(&request)?, &client_nonce)?;
        let attempt = self.trust_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let params = to_value(&CreateTskParams { signed_record })?;
        let reply = match self.connection.call(CREATE_TSK, params).await {
            Ok(reply) => reply,
            Err(CallError::Remote(error)) => {
                tracing::warn!(code = %error.code, "service refused the SCK: {}", error.text);
                credentials.set_sck(None).await?;
                return Ok(Step::Next(Phase::RegisterSck));
            },
            Err(error) => return Err(error.into()),
        };

        let reply: CreateTskReply = from_value(&reply)?;
        let record = SignedRecord::unpack(&reply.signed_record)
            .map_err(|e| SessionError::Authentication(format!("createTSK reply: {e}")))?;
        if record.nonce() != client_nonce.as_slice() {
            return Err(SessionError::Authentication(
                "createTSK reply does not echo the client nonce".to_string(),
            ));
        }

        let signer = record.signer_address();
        if !trusted.contains(&signer) {
            if attempt < self.config.trust_attempts {
                tracing::warn!(attempt, ?signer, "createTSK reply signed by an unknown key");
                self.addresses.refresh();
                return Ok(Step::Next(Phase::MintTsk));
            }
            if rounds.escalated {
                return Err(SessionError::ProvisioningFailed {
                    attempts: attempt,
                    reason: "service identity could not be confirmed".to_string(),
                });
            }
            // Escalates to a new SCK even though the SCK itself was never
            // rejected.
            tracing::warn!(attempt, ?signer, "service identity unconfirmed, discarding the SCK");
            rounds.escalated = true;
            rounds.tsk = 0;
            credentials.set_sck(None).await?;
            return Ok(Step::Next(Phase::RegisterSck));
        }

        let grant: CreateTskGrant = from_bytes(record.payload())?;
        let opened = sck
            .open(&grant.encrypted_tsk)
            .map_err(|e| SessionError::Authentication(format!("TSK grant: {e}")))?;
        let grant: TskGrant = from_bytes(&opened)?;
        let tsk = SymmetricKey::from_slice(&grant.tsk)?;

        if let Some(session_id) = grant.session_id {
            credentials.set_session_id(Some(session_id))?;
        }
        credentials.set_tsk(Some(tsk))?;
        self.set_expires_at(Some(grant.expires_at));
        self.tsk_creations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(expires_at = grant.expires_at, "minted session key");

        Ok(Step::Next(Phase::ResumeTsk))
    }

    async fn register_sck(
        &self,
        credentials: &mut Credentials<S>,
    ) -> Result<Step<C, E>, SessionError> {
        credentials.set_sck(None).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let sck = Arc::new(PrivateKey::generate(
                self.config.key_strength,
                &self.env.random_array(),
            )?);

            match self.register(&sck).await {
                Ok(session_id) => {
                    credentials.set_sck(Some(sck)).await?;
                    credentials.set_session_id(Some(session_id))?;
                    self.sck_registrations.fetch_add(1, Ordering::SeqCst);
                    tracing::info!(attempt, "registered new SCK");
                    return Ok(Step::Next(Phase::StartSession));
                },
                Err(SessionError::Remote(error)) => {
                    tracing::warn!(attempt, code = %error.code, "SCK registration rejected: {}", error.text);
                    if attempt >= self.config.max_registration_attempts {
                        return Err(SessionError::ProvisioningFailed {
                            attempts: attempt,
                            reason: error.to_string(),
                        });
                    }
                    self.env.sleep(self.config.backoff_for(attempt)).await;
                },
                Err(error) => return Err(error),
            }
        }
    }

    /// `requestSCK`, POW, `registerSCK` for one candidate key.
    async fn register(&self, sck: &PrivateKey) -> Result<String, SessionError> {
        let params = to_value(&RequestSckParams {
            sck_address: sck.address(),
            test_mode: self.config.test_mode,
        })?;
        let task: RequestSckReply = from_value(&self.connection.call(REQUEST_SCK, params).await?)?;

        let solution = solve_pow(task.pow_task).await?;
        let payload = to_bytes(&PowResultPayload { pow_result: solution.to_bytes().to_vec() })?;
        let nonce: [u8; NONCE_SIZE] = self.env.random_array();
        let signed_record = SignedRecord::pack_with_key(sck, &payload, &nonce)?;

        let params = to_value(&RegisterSckParams { context: task.context, signed_record })?;
        let reply: RegisterSckReply =
            from_value(&self.connection.call(REGISTER_SCK, params).await?)?;
        Ok(reply.session_id)
    }
}

/// Solve on the blocking pool when a runtime is available.
async fn solve_pow(task: PowTask) -> Result<PowSolution, SessionError> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return Ok(pow::solve(&task)?);
    };
    match runtime.spawn_blocking(move || pow::solve(&task)).await {
        Ok(solution) => Ok(solution?),
        Err(e) if e.is_cancelled() => Err(SessionError::Cancelled),
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pow_runs_on_blocking_pool() {
        let task = PowTask::new(6, b"register".to_vec());
        let solution = solve_pow(task.clone()).await.unwrap();
        assert!(pow::check(&task, &solution.to_bytes()));
    }

    #[tokio::test]
    async fn unsatisfiable_pow_is_an_error() {
        let error = solve_pow(PowTask::new(1000, Vec::new())).await.unwrap_err();
        assert!(matches!(error, SessionError::Pow(_)));
    }
}

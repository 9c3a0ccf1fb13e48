//! In-process Parsec service implementing [`Connection`].
//!
//! Verifies everything a real service verifies (POW solutions, record
//! signatures, client nonces, TSK seals) and exposes fault knobs so tests can
//! drive the session through each recovery path.
//!
//! ```text
//! requestSCK  ──► pending registration (context id, POW task)
//! registerSCK ──► SCK address → session id
//! createTSK   ──► session.tsk = fresh key, grant sealed to the SCK
//! cmd         ──► getSessionInfo | destroySession | echo
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use parsec_core::{
    CallError, Command, Connection, Environment, ErrorCode, KeyAddressProvider, RemoteError,
    Value,
    pow::{self, PowTask},
    protocol::{
        CMD, CREATE_TSK, CmdParams, CmdReply, CreateTskGrant, CreateTskParams, CreateTskReply,
        CreateTskRequest, DESTROY_SESSION, GET_SESSION_INFO, PowResultPayload, REGISTER_SCK,
        REQUEST_SCK, RegisterSckParams, RegisterSckReply, RequestSckParams, RequestSckReply,
        SessionInfo, TskGrant,
    },
    rpc::{empty_map, from_bytes, from_value, to_bytes, to_value},
};
use parsec_crypto::{KeyAddress, PrivateKey, SignedRecord, SymmetricKey};

use crate::SimEnv;

/// Command that returns its arguments.
pub const ECHO: &str = "echo";

/// POW difficulty for test-mode registrations.
pub const TEST_POW_LENGTH: u32 = 4;

/// POW difficulty otherwise.
pub const POW_LENGTH: u32 = 12;

/// Lifetime of a granted TSK (seconds).
pub const TSK_LIFETIME_SECS: u64 = 3600;

struct PendingRegistration {
    address: KeyAddress,
    task: PowTask,
}

struct ServiceSession {
    sck: KeyAddress,
    tsk: Option<SymmetricKey>,
    expires_at: u64,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    rejected_registrations: u32,
    untrusted_grants: u32,
    tamper_nonce: bool,
    discard_granted_tsks: bool,
}

#[derive(Default)]
struct ServiceState {
    next_id: u64,
    pending: HashMap<u64, PendingRegistration>,
    /// SCK address → session id
    registrations: HashMap<KeyAddress, String>,
    sessions: HashMap<String, ServiceSession>,
    calls: HashMap<String, usize>,
    faults: Faults,
}

/// Simulated Parsec service.
pub struct SimService {
    env: SimEnv,
    service_key: PrivateKey,
    impostor_key: PrivateKey,
    state: Mutex<ServiceState>,
}

impl SimService {
    /// Service drawing its keys and nonces from `env`.
    pub fn new(env: SimEnv) -> Arc<Self> {
        let service_key = PrivateKey::from_seed(&env.random_array());
        let impostor_key = PrivateKey::from_seed(&env.random_array());
        Arc::new(Self { env, service_key, impostor_key, state: Mutex::default() })
    }

    /// Address clients should trust.
    pub fn address(&self) -> KeyAddress {
        self.service_key.address()
    }

    /// Provider returning [`address`](Self::address).
    pub fn addresses(&self) -> KeyAddressProvider {
        KeyAddressProvider::fixed(vec![self.address()])
    }

    /// Number of calls to a top-level method or a `cmd` command.
    pub fn calls(&self, method: &str) -> usize {
        self.with_state(|state| state.calls.get(method).copied().unwrap_or(0))
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.with_state(|state| state.sessions.len())
    }

    /// Whether `session_id` is live.
    pub fn has_session(&self, session_id: &str) -> bool {
        self.with_state(|state| state.sessions.contains_key(session_id))
    }

    /// Fail every call with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.faults.offline = offline);
    }

    /// Reject the next `count` registrations with `sck_rejected`.
    pub fn reject_registrations(&self, count: u32) {
        self.with_state(|state| state.faults.rejected_registrations = count);
    }

    /// Sign `createTSK` replies with a key clients do not trust.
    pub fn set_untrusted_signer(&self, untrusted: bool) {
        self.sign_untrusted(if untrusted { u32::MAX } else { 0 });
    }

    /// Sign the next `count` `createTSK` replies with an untrusted key.
    pub fn sign_untrusted(&self, count: u32) {
        self.with_state(|state| state.faults.untrusted_grants = count);
    }

    /// Echo a wrong nonce in `createTSK` replies.
    pub fn set_nonce_tampering(&self, tamper: bool) {
        self.with_state(|state| state.faults.tamper_nonce = tamper);
    }

    /// Forget each TSK right after granting it.
    pub fn set_discard_granted_tsks(&self, discard: bool) {
        self.with_state(|state| state.faults.discard_granted_tsks = discard);
    }

    /// Forget every TSK; sessions and SCKs stay registered.
    pub fn drop_session_keys(&self) {
        self.with_state(|state| {
            for session in state.sessions.values_mut() {
                session.tsk = None;
            }
        });
    }

    /// Forget every SCK registration and session.
    pub fn forget_registrations(&self) {
        self.with_state(|state| {
            state.registrations.clear();
            state.sessions.clear();
        });
    }

    #[allow(clippy::expect_used)]
    fn with_state<R>(&self, f: impl FnOnce(&mut ServiceState) -> R) -> R {
        f(&mut self.state.lock().expect("Mutex poisoned"))
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, CallError> {
        match method {
            REQUEST_SCK => self.request_sck(&from_value(params)?),
            REGISTER_SCK => self.register_sck(from_value(params)?),
            CREATE_TSK => self.create_tsk(&from_value(params)?),
            CMD => self.cmd(&from_value(params)?),
            other => Err(RemoteError::new(ErrorCode::CommandUnknown, other).into()),
        }
    }

    fn request_sck(&self, params: &RequestSckParams) -> Result<Value, CallError> {
        let length = if params.test_mode { TEST_POW_LENGTH } else { POW_LENGTH };
        let task = PowTask::new(length, self.env.random_array::<16>().to_vec());

        let context = self.with_state(|state| {
            state.next_id += 1;
            let id = state.next_id;
            state.pending.insert(
                id,
                PendingRegistration { address: params.sck_address.clone(), task: task.clone() },
            );
            id
        });
        to_value(&RequestSckReply { pow_task: task, context: Value::from(context) })
    }

    fn register_sck(&self, params: RegisterSckParams) -> Result<Value, CallError> {
        let context: u64 = from_value(&params.context)?;
        let pending = self
            .with_state(|state| state.pending.remove(&context))
            .ok_or_else(|| rejected(ErrorCode::SckRejected, "unknown registration context"))?;

        let record = SignedRecord::unpack(&params.signed_record)
            .map_err(|e| rejected(ErrorCode::SckRejected, e.to_string()))?;
        if record.signer_address() != pending.address {
            return Err(rejected(ErrorCode::SckRejected, "record not signed by the candidate SCK"));
        }
        let payload: PowResultPayload = from_bytes(record.payload())?;
        if !pow::check(&pending.task, &payload.pow_result) {
            return Err(rejected(ErrorCode::PowFailed, "wrong POW solution"));
        }

        let session_id = self.with_state(|state| {
            if state.faults.rejected_registrations > 0 {
                state.faults.rejected_registrations -= 1;
                return Err(rejected(ErrorCode::SckRejected, "registration declined"));
            }
            state.next_id += 1;
            let session_id = format!("sid-{}", state.next_id);
            state.registrations.insert(pending.address.clone(), session_id.clone());
            state.sessions.insert(
                session_id.clone(),
                ServiceSession { sck: pending.address, tsk: None, expires_at: 0 },
            );
            Ok(session_id)
        })?;
        tracing::debug!(%session_id, "registered SCK");

        to_value(&RegisterSckReply { session_id })
    }

    fn create_tsk(&self, params: &CreateTskParams) -> Result<Value, CallError> {
        let record = SignedRecord::unpack(&params.signed_record)
            .map_err(|e| rejected(ErrorCode::SckUnknown, e.to_string()))?;
        let request: CreateTskRequest = from_bytes(record.payload())?;
        if request.client_nonce != record.nonce() {
            return Err(rejected(ErrorCode::SckRejected, "nonce does not match the record"));
        }

        let tsk = SymmetricKey::new(self.env.random_array());
        let expires_at = self.env.wall_clock_secs() + TSK_LIFETIME_SECS;
        let (session_id, untrusted, tamper) = self.with_state(|state| {
            let sck = record.signer_address();
            let session_id = state
                .registrations
                .get(&sck)
                .cloned()
                .ok_or_else(|| rejected(ErrorCode::SckUnknown, "SCK is not registered"))?;
            let session = state
                .sessions
                .get_mut(&session_id)
                .ok_or_else(|| rejected(ErrorCode::SckUnknown, "session is gone"))?;
            if !state.faults.discard_granted_tsks {
                session.tsk = Some(tsk.clone());
            }
            session.expires_at = expires_at;
            let untrusted = state.faults.untrusted_grants > 0;
            state.faults.untrusted_grants = state.faults.untrusted_grants.saturating_sub(1);
            Ok::<_, CallError>((session_id, untrusted, state.faults.tamper_nonce))
        })?;

        let grant = TskGrant {
            tsk: tsk.as_bytes().to_vec(),
            expires_at,
            session_id: Some(session_id),
        };
        let encrypted_tsk = record.signer().seal(
            &to_bytes(&grant)?,
            self.env.random_array(),
            self.env.random_array(),
        );

        let signer = if untrusted { &self.impostor_key } else { &self.service_key };
        let nonce = if tamper { self.env.random_array::<32>().to_vec() } else { request.client_nonce };
        let signed_record =
            SignedRecord::pack_with_key(signer, &to_bytes(&CreateTskGrant { encrypted_tsk })?, &nonce)
                .map_err(|e| CallError::Codec(e.to_string()))?;
        to_value(&CreateTskReply { signed_record })
    }

    fn cmd(&self, params: &CmdParams) -> Result<Value, CallError> {
        let (tsk, expires_at) = self.with_state(|state| {
            let session = state
                .sessions
                .get(&params.auth_token)
                .ok_or_else(|| rejected(ErrorCode::SessionMissing, "no such session"))?;
            let tsk = session
                .tsk
                .clone()
                .ok_or_else(|| rejected(ErrorCode::TskMissing, "session has no TSK"))?;
            Ok::<_, CallError>((tsk, session.expires_at))
        })?;

        let opened = tsk.open(&params.params).map_err(|_| {
            CallError::Remote(RemoteError::from_wire("unknown_error", "HMAC verification failed"))
        })?;
        let (command, args) = Command::unpack_command(&opened)?;
        self.count(&command);

        let reply = match command.as_str() {
            GET_SESSION_INFO => to_value(&SessionInfo { expires_at })?,
            DESTROY_SESSION => {
                self.with_state(|state| {
                    if let Some(session) = state.sessions.remove(&params.auth_token) {
                        state.registrations.remove(&session.sck);
                    }
                });
                empty_map()
            },
            ECHO => args,
            other => {
                let error = RemoteError::new(ErrorCode::CommandUnknown, other);
                return to_value(&CmdReply {
                    result: tsk.seal(&Command::pack_reply(Err(error))?, self.env.random_array()),
                });
            },
        };

        let sealed = tsk.seal(&Command::pack_reply(Ok(reply))?, self.env.random_array());
        to_value(&CmdReply { result: sealed })
    }

    fn count(&self, method: &str) {
        self.with_state(|state| *state.calls.entry(method.to_string()).or_default() += 1);
    }
}

#[async_trait]
impl Connection for SimService {
    async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        tokio::task::yield_now().await;
        self.count(method);
        if self.with_state(|state| state.faults.offline) {
            return Err(CallError::Transport("service offline".to_string()));
        }
        self.handle(method, &params)
    }
}

fn rejected(code: ErrorCode, text: impl Into<String>) -> CallError {
    CallError::Remote(RemoteError::new(code, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let service = SimService::new(SimEnv::new());
        let error = service.call("nope", empty_map()).await.unwrap_err();
        assert!(matches!(error, CallError::Remote(RemoteError { code: ErrorCode::CommandUnknown, .. })));
    }

    #[tokio::test]
    async fn offline_is_transport() {
        let service = SimService::new(SimEnv::new());
        service.set_offline(true);
        assert!(matches!(
            service.call(REQUEST_SCK, empty_map()).await,
            Err(CallError::Transport(_))
        ));
        assert_eq!(service.calls(REQUEST_SCK), 1);
    }

    #[tokio::test]
    async fn request_sck_honours_test_mode() {
        let service = SimService::new(SimEnv::new());
        let key = PrivateKey::from_seed(&[1; 64]);
        for (test_mode, length) in [(true, TEST_POW_LENGTH), (false, POW_LENGTH)] {
            let params = to_value(&RequestSckParams { sck_address: key.address(), test_mode }).unwrap();
            let reply: RequestSckReply = from_value(&service.call(REQUEST_SCK, params).await.unwrap()).unwrap();
            assert_eq!(reply.pow_task.length, length);
        }
    }

    #[tokio::test]
    async fn wrong_pow_is_rejected() {
        let service = SimService::new(SimEnv::new());
        let key = PrivateKey::from_seed(&[2; 64]);
        let params =
            to_value(&RequestSckParams { sck_address: key.address(), test_mode: false }).unwrap();
        let reply: RequestSckReply =
            from_value(&service.call(REQUEST_SCK, params).await.unwrap()).unwrap();

        let mut counter = pow::solve(&reply.pow_task).unwrap().counter() + 1;
        while pow::check(&reply.pow_task, &counter.to_le_bytes()) {
            counter += 1;
        }
        let payload = to_bytes(&PowResultPayload { pow_result: counter.to_le_bytes().to_vec() }).unwrap();
        let signed_record = SignedRecord::pack_with_key(&key, &payload, &[0; 24]).unwrap();
        let params = to_value(&RegisterSckParams { context: reply.context, signed_record }).unwrap();

        let error = service.call(REGISTER_SCK, params).await.unwrap_err();
        assert!(matches!(error, CallError::Remote(RemoteError { code: ErrorCode::PowFailed, .. })));
        assert_eq!(service.session_count(), 0);
    }
}

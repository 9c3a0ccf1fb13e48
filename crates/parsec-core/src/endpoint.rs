//! Authenticated, encrypted channel built from a TSK and a SessionId.
//!
//! An endpoint is an encrypted version of the anonymous connection: every
//! command is sealed with the TSK and sent through `cmd` together with the
//! session id.
//!
//! ```text
//! call(method, params)
//!   -> cmd { authToken: session_id, params: seal(TSK, {cmd, args}) }
//!   <- { result: seal(TSK, {result} | {error}) }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parsec_crypto::SymmetricKey;
use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    protocol::{CMD, CmdParams, CmdReply},
    rpc::{CallError, Command, Connection, Value, from_value, to_value},
};

/// Serialized endpoint credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEndpoint {
    /// Raw TSK bytes
    #[serde(with = "serde_bytes")]
    pub session_key: Vec<u8>,
    /// Session id sent as the auth token
    pub auth_token: String,
}

/// Encrypted, authenticated channel over a [`Connection`].
pub struct Endpoint<C, E> {
    connection: Arc<C>,
    tsk: SymmetricKey,
    session_id: String,
    env: E,
}

impl<C: Connection, E: Environment> Endpoint<C, E> {
    /// Endpoint using `tsk` for the session `session_id`.
    pub fn new(connection: Arc<C>, tsk: SymmetricKey, session_id: String, env: E) -> Self {
        Self { connection, tsk, session_id, env }
    }

    /// Session id this endpoint authenticates as.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// TSK this endpoint encrypts with.
    pub fn tsk(&self) -> &SymmetricKey {
        &self.tsk
    }

    /// Credentials needed to rebuild this endpoint.
    pub fn serialize(&self) -> SerializedEndpoint {
        SerializedEndpoint {
            session_key: self.tsk.as_bytes().to_vec(),
            auth_token: self.session_id.clone(),
        }
    }

    /// Execute `method` through the encrypted channel.
    ///
    /// # Errors
    ///
    /// - `Remote` if the service rejects the carrier call or the command
    /// - `Transport` if no answer arrives
    /// - `Authentication` if the reply cannot be opened with the TSK
    /// - `Codec` if a message is malformed
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        let command = Command::pack(method, params)?;
        let sealed = self.tsk.seal(&command, self.env.random_array());

        let carrier = to_value(&CmdParams { auth_token: self.session_id.clone(), params: sealed })?;
        let reply: CmdReply = from_value(&self.connection.call(CMD, carrier).await?)?;

        let opened = self
            .tsk
            .open(&reply.result)
            .map_err(|e| CallError::Authentication(format!("reply failed TSK check: {e}")))?;
        Command::unpack(&opened)
    }
}

#[async_trait]
impl<C: Connection, E: Environment> Connection for Endpoint<C, E> {
    async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
        Endpoint::call(self, method, params).await
    }
}

impl<C, E> std::fmt::Debug for Endpoint<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("session_id", &self.session_id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        rpc::{ErrorCode, RemoteError, empty_map},
        system_env::SystemEnv,
    };

    /// Service side of `cmd` for a single TSK
    struct EchoService {
        tsk: SymmetricKey,
        seen_tokens: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connection for EchoService {
        async fn call(&self, method: &str, params: Value) -> Result<Value, CallError> {
            assert_eq!(method, CMD);
            let params: CmdParams = from_value(&params)?;
            self.seen_tokens.lock().unwrap().push(params.auth_token);

            let opened = self.tsk.open(&params.params).map_err(|_| {
                RemoteError::from_wire("unknown_error", "HMAC verification failed")
            })?;
            let (command, args) = Command::unpack_command(&opened)?;
            let reply = match command.as_str() {
                "echo" => Ok(args),
                _ => Err(RemoteError::new(ErrorCode::CommandUnknown, command)),
            };
            let sealed = self.tsk.seal(&Command::pack_reply(reply)?, [3; 24]);
            to_value(&CmdReply { result: sealed })
        }
    }

    fn service(key: u8) -> Arc<EchoService> {
        Arc::new(EchoService { tsk: SymmetricKey::new([key; 32]), seen_tokens: Mutex::default() })
    }

    #[tokio::test]
    async fn call_roundtrips_through_cmd() {
        let service = service(1);
        let endpoint =
            Endpoint::new(service.clone(), SymmetricKey::new([1; 32]), "sid-1".into(), SystemEnv);

        let args = Value::Text("hello".into());
        assert_eq!(endpoint.call("echo", args.clone()).await.unwrap(), args);
        assert_eq!(*service.seen_tokens.lock().unwrap(), vec!["sid-1".to_string()]);
    }

    #[tokio::test]
    async fn command_errors_are_remote() {
        let endpoint =
            Endpoint::new(service(2), SymmetricKey::new([2; 32]), "sid".into(), SystemEnv);

        let error = endpoint.call("nope", empty_map()).await.unwrap_err();
        assert!(matches!(error, CallError::Remote(RemoteError { code: ErrorCode::CommandUnknown, .. })));
    }

    #[tokio::test]
    async fn wrong_tsk_is_a_mac_failure() {
        let endpoint =
            Endpoint::new(service(3), SymmetricKey::new([4; 32]), "sid".into(), SystemEnv);

        let error = endpoint.call("echo", empty_map()).await.unwrap_err();
        let CallError::Remote(remote) = error else {
            panic!("expected remote error, got {error:?}");
        };
        assert!(remote.code.is_session_key_failure());
    }

    #[test]
    fn serialize_exposes_credentials() {
        let endpoint =
            Endpoint::new(service(5), SymmetricKey::new([5; 32]), "sid-5".into(), SystemEnv);
        let serialized = endpoint.serialize();
        assert_eq!(serialized.session_key, vec![5; 32]);
        assert_eq!(serialized.auth_token, "sid-5");
    }
}

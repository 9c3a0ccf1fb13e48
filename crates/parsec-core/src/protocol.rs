//! Typed Parsec.1 protocol messages.
//!
//! Field names follow the wire (camelCase, upper-case acronyms). Anonymous
//! provisioning goes straight over the [`Connection`](crate::rpc::Connection);
//! session-level commands travel inside `cmd`:
//!
//! ```text
//! requestSCK  {SCKAddress, testMode}          -> {POWTask, context}
//! registerSCK {context, signedRecord}         -> {sessionId}
//!              signedRecord by SCK, payload {POWResult}
//! createTSK   {signedRecord}                  -> {signedRecord}
//!              by SCK, nonce = clientNonce       by service, nonce = clientNonce
//!              payload CreateTskRequest          payload {encryptedTSK}
//!                                                 sealed to SCK: TskGrant
//! cmd         {authToken, params}             -> {result}
//!              params = TSK-sealed Command       result = TSK-sealed reply
//! ```

use parsec_crypto::KeyAddress;
use serde::{Deserialize, Serialize};

use crate::{pow::PowTask, rpc::Value};

/// Anonymous: start SCK registration
pub const REQUEST_SCK: &str = "requestSCK";
/// Anonymous: complete SCK registration with a POW solution
pub const REGISTER_SCK: &str = "registerSCK";
/// Anonymous: exchange a signed SCK request for a TSK
pub const CREATE_TSK: &str = "createTSK";
/// Anonymous: carrier for TSK-authenticated commands
pub const CMD: &str = "cmd";
/// Session: verify the TSK and report its expiry
pub const GET_SESSION_INFO: &str = "getSessionInfo";
/// Session: delete the session on the service
pub const DESTROY_SESSION: &str = "destroySession";

/// `requestSCK` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSckParams {
    /// Address of the candidate SCK
    #[serde(rename = "SCKAddress")]
    pub sck_address: KeyAddress,
    /// Ask the service for a test-grade (cheap) POW task
    #[serde(rename = "testMode")]
    pub test_mode: bool,
}

/// `requestSCK` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSckReply {
    /// POW task to solve before registering
    #[serde(rename = "POWTask")]
    pub pow_task: PowTask,
    /// Opaque registration context, echoed back in `registerSCK`
    pub context: Value,
}

/// `registerSCK` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSckParams {
    /// Context from `requestSCK`
    pub context: Value,
    /// Record signed by the new SCK carrying [`PowResultPayload`]
    #[serde(rename = "signedRecord", with = "serde_bytes")]
    pub signed_record: Vec<u8>,
}

/// Payload of the `registerSCK` signed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowResultPayload {
    /// Wire-form POW solution
    #[serde(rename = "POWResult", with = "serde_bytes")]
    pub pow_result: Vec<u8>,
}

/// `registerSCK` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSckReply {
    /// Session bound to the registered SCK
    pub session_id: String,
}

/// `createTSK` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTskParams {
    /// Record signed by the SCK carrying [`CreateTskRequest`]
    #[serde(with = "serde_bytes")]
    pub signed_record: Vec<u8>,
}

/// Payload of the `createTSK` request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTskRequest {
    /// Fresh random nonce, also the record nonce
    #[serde(with = "serde_bytes")]
    pub client_nonce: Vec<u8>,
    /// Session the client believes it holds
    pub session_id: Option<String>,
    /// Service addresses the client trusts
    pub service_key_addresses: Vec<KeyAddress>,
}

/// `createTSK` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTskReply {
    /// Record signed by the service carrying [`CreateTskGrant`]
    #[serde(with = "serde_bytes")]
    pub signed_record: Vec<u8>,
}

/// Payload of the `createTSK` reply record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTskGrant {
    /// [`TskGrant`] sealed to the SCK
    #[serde(rename = "encryptedTSK", with = "serde_bytes")]
    pub encrypted_tsk: Vec<u8>,
}

/// A TSK issued by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TskGrant {
    /// Raw symmetric key bytes
    #[serde(rename = "TSK", with = "serde_bytes")]
    pub tsk: Vec<u8>,
    /// Advisory expiry (unix seconds)
    #[serde(rename = "expiresAt")]
    pub expires_at: u64,
    /// Session the TSK is bound to, replaces the stored one when present
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// `cmd` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmdParams {
    /// Session id authenticating the call
    pub auth_token: String,
    /// TSK-sealed command block
    #[serde(with = "serde_bytes")]
    pub params: Vec<u8>,
}

/// `cmd` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdReply {
    /// TSK-sealed reply block
    #[serde(with = "serde_bytes")]
    pub result: Vec<u8>,
}

/// `getSessionInfo` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Advisory TSK expiry (unix seconds)
    pub expires_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{from_bytes, from_value, to_bytes, to_value};

    #[test]
    fn wire_field_names() {
        let value = to_value(&TskGrant { tsk: vec![1], expires_at: 9, session_id: None }).unwrap();
        let Value::Map(entries) = value else {
            panic!("grant must encode as a map");
        };
        let keys: Vec<_> = entries.iter().filter_map(|(k, _)| k.as_text()).collect();
        assert_eq!(keys, ["TSK", "expiresAt", "sessionId"]);
    }

    #[test]
    fn byte_fields_encode_as_byte_strings() {
        let value = to_value(&CreateTskParams { signed_record: vec![1, 2, 3] }).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![(Value::Text("signedRecord".into()), Value::Bytes(vec![1, 2, 3]))])
        );

        let value = to_value(&PowTask::new(4, vec![9, 9])).unwrap();
        let Value::Map(entries) = value else {
            panic!("task must encode as a map");
        };
        assert!(entries.contains(&(Value::Text("source".into()), Value::Bytes(vec![9, 9]))));
    }

    #[test]
    fn grant_without_session_id_decodes() {
        #[derive(Serialize)]
        struct BareGrant {
            #[serde(rename = "TSK", with = "serde_bytes")]
            tsk: Vec<u8>,
            #[serde(rename = "expiresAt")]
            expires_at: u64,
        }

        let bytes = to_bytes(&BareGrant { tsk: vec![7; 32], expires_at: 100 }).unwrap();
        let grant: TskGrant = from_bytes(&bytes).unwrap();
        assert_eq!(grant.session_id, None);
        assert_eq!(grant.tsk, vec![7; 32]);
    }

    #[test]
    fn request_sck_reply_keeps_context_opaque() {
        let reply = RequestSckReply {
            pow_task: PowTask::new(4, vec![1, 2]),
            context: Value::Text("ctx-17".into()),
        };
        let decoded: RequestSckReply = from_value(&to_value(&reply).unwrap()).unwrap();
        assert_eq!(decoded, reply);
    }
}

//! Remote call surface.
//!
//! Every Parsec exchange is a named method with a CBOR map of parameters.
//! Commands and replies travel as CBOR envelopes:
//!
//! ```text
//! request: { cmd: "<method>", args: { ... } }
//! reply:   { result: { ... } }                 success
//!          { error: { code: "...", text: "..." } }   structured rejection
//! ```
//!
//! A structured rejection is a [`RemoteError`] with a closed [`ErrorCode`].
//! Everything that prevents an answer from arriving at all is a transport
//! error. The session engine recovers from the former and never from the
//! latter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Dynamic CBOR value carried by commands and replies.
pub type Value = ciborium::Value;

/// Code sent for errors the service did not classify
pub const UNKNOWN_ERROR_CODE: &str = "unknown_error";

/// Closed set of remote error codes the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The TSK is not valid (expired, revoked, or never issued)
    TskInvalid,
    /// The service has no TSK for this session
    TskMissing,
    /// The session id is unknown to the service
    SessionMissing,
    /// Authenticated traffic failed MAC verification
    MacMismatch,
    /// The SCK is not registered with the service
    SckUnknown,
    /// The service refuses the SCK (registration or TSK creation)
    SckRejected,
    /// The POW solution was rejected
    PowFailed,
    /// The method is not known to the service
    CommandUnknown,
    /// Any other code, kept verbatim
    Other(String),
}

impl ErrorCode {
    /// Classify a wire code.
    ///
    /// This is the only place free text is inspected: an unclassified error
    /// whose text reports a MAC failure becomes [`ErrorCode::MacMismatch`].
    pub fn from_wire(code: &str, text: &str) -> Self {
        match code {
            "tsk_invalid" => Self::TskInvalid,
            "tsk_missing" => Self::TskMissing,
            "session_missing" => Self::SessionMissing,
            "mac_mismatch" => Self::MacMismatch,
            "sck_unknown" => Self::SckUnknown,
            "sck_rejected" => Self::SckRejected,
            "pow_failed" => Self::PowFailed,
            "unknown_command" => Self::CommandUnknown,
            UNKNOWN_ERROR_CODE if text.contains("HMAC") || text.contains("MAC ") => {
                Self::MacMismatch
            },
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire form of the code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TskInvalid => "tsk_invalid",
            Self::TskMissing => "tsk_missing",
            Self::SessionMissing => "session_missing",
            Self::MacMismatch => "mac_mismatch",
            Self::SckUnknown => "sck_unknown",
            Self::SckRejected => "sck_rejected",
            Self::PowFailed => "pow_failed",
            Self::CommandUnknown => "unknown_command",
            Self::Other(code) => code,
        }
    }

    /// Whether the error means the current TSK/session can no longer be used.
    ///
    /// These are the errors `Session::call` answers with one session key
    /// refresh and one retry.
    pub fn is_session_key_failure(&self) -> bool {
        matches!(self, Self::TskInvalid | Self::TskMissing | Self::SessionMissing | Self::MacMismatch)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rejection returned by the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {text}")]
pub struct RemoteError {
    /// Classified error code
    pub code: ErrorCode,
    /// Human-readable explanation from the service
    pub text: String,
}

impl RemoteError {
    /// Remote error with `code` and `text`.
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self { code, text: text.into() }
    }

    /// Remote error from its wire form.
    pub fn from_wire(code: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        Self { code: ErrorCode::from_wire(code, &text), text }
    }
}

/// Errors produced by a single remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The service answered with a structured rejection
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No answer could be obtained (network, timeout, transport failure)
    #[error("transport error: {0}")]
    Transport(String),

    /// A command or reply could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// An authenticated reply could not be opened with the session key
    #[error("authentication error: {0}")]
    Authentication(String),
}

/// Lower-level connection capable of anonymous remote calls.
///
/// Transports implement this; `Endpoint` and `Session` layer encryption and
/// recovery on top. Timeouts are the implementation's concern.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Execute `method` with `params` and return its result map.
    ///
    /// # Errors
    ///
    /// - `Remote` if the service rejects the call
    /// - `Transport` if no answer arrives
    async fn call(&self, method: &str, params: Value) -> Result<Value, CallError>;
}

#[derive(Serialize, Deserialize)]
struct CommandEnvelope {
    cmd: String,
    args: Value,
}

#[derive(Serialize, Deserialize)]
struct WireError {
    code: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize)]
struct ReplyEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
}

/// Command and reply envelope codec.
pub struct Command;

impl Command {
    /// Encode `method` and `args` as a command block.
    pub fn pack(method: &str, args: Value) -> Result<Vec<u8>, CallError> {
        to_bytes(&CommandEnvelope { cmd: method.to_string(), args })
    }

    /// Decode a command block into `(method, args)`.
    pub fn unpack_command(packed: &[u8]) -> Result<(String, Value), CallError> {
        let envelope: CommandEnvelope = from_bytes(packed)?;
        Ok((envelope.cmd, envelope.args))
    }

    /// Encode the outcome of executing a command.
    pub fn pack_reply(reply: Result<Value, RemoteError>) -> Result<Vec<u8>, CallError> {
        let envelope = match reply {
            Ok(result) => ReplyEnvelope { result: Some(result), error: None },
            Err(error) => ReplyEnvelope {
                result: None,
                error: Some(WireError { code: error.code.as_str().to_string(), text: error.text }),
            },
        };
        to_bytes(&envelope)
    }

    /// Decode a reply block, returning the result (an empty map if the
    /// service sent none).
    ///
    /// # Errors
    ///
    /// - `Remote` if the reply carries an error
    /// - `Codec` if the block is not a reply
    pub fn unpack(packed: &[u8]) -> Result<Value, CallError> {
        let envelope: ReplyEnvelope = from_bytes(packed)?;
        if let Some(error) = envelope.error {
            return Err(RemoteError::from_wire(&error.code, error.text).into());
        }
        Ok(envelope.result.unwrap_or_else(empty_map))
    }
}

/// Empty CBOR map, the result of commands that return nothing.
pub fn empty_map() -> Value {
    Value::Map(Vec::new())
}

/// Convert a typed message into a CBOR value.
pub fn to_value<T: Serialize>(message: &T) -> Result<Value, CallError> {
    Value::serialized(message).map_err(|e| CallError::Codec(e.to_string()))
}

/// Convert a CBOR value into a typed message.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, CallError> {
    value.deserialized().map_err(|e| CallError::Codec(e.to_string()))
}

/// CBOR-encode a message, e.g. a signed record payload.
pub fn to_bytes<T: Serialize>(message: &T) -> Result<Vec<u8>, CallError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(message, &mut bytes).map_err(|e| CallError::Codec(e.to_string()))?;
    Ok(bytes)
}

/// Decode a CBOR message.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CallError> {
    ciborium::from_reader(bytes).map_err(|e| CallError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_roundtrip() {
        let codes = [
            ErrorCode::TskInvalid,
            ErrorCode::TskMissing,
            ErrorCode::SessionMissing,
            ErrorCode::MacMismatch,
            ErrorCode::SckUnknown,
            ErrorCode::SckRejected,
            ErrorCode::PowFailed,
            ErrorCode::CommandUnknown,
            ErrorCode::Other("quota_exceeded".to_string()),
        ];
        for code in codes {
            assert_eq!(ErrorCode::from_wire(code.as_str(), ""), code);
        }
    }

    #[test]
    fn unknown_error_with_mac_text_is_mac_mismatch() {
        assert_eq!(
            ErrorCode::from_wire(UNKNOWN_ERROR_CODE, "HMAC verification failed"),
            ErrorCode::MacMismatch
        );
        assert_eq!(
            ErrorCode::from_wire(UNKNOWN_ERROR_CODE, "database offline"),
            ErrorCode::Other(UNKNOWN_ERROR_CODE.to_string())
        );
        // Only unclassified errors are inspected
        assert_eq!(
            ErrorCode::from_wire("quota_exceeded", "HMAC"),
            ErrorCode::Other("quota_exceeded".to_string())
        );
    }

    #[test]
    fn session_key_failures() {
        assert!(ErrorCode::TskInvalid.is_session_key_failure());
        assert!(ErrorCode::TskMissing.is_session_key_failure());
        assert!(ErrorCode::SessionMissing.is_session_key_failure());
        assert!(ErrorCode::MacMismatch.is_session_key_failure());
        assert!(!ErrorCode::SckRejected.is_session_key_failure());
        assert!(!ErrorCode::Other(UNKNOWN_ERROR_CODE.to_string()).is_session_key_failure());
    }

    #[test]
    fn command_envelope_roundtrip() {
        let args = Value::Map(vec![(Value::Text("x".into()), Value::Integer(7.into()))]);
        let packed = Command::pack("echo", args.clone()).unwrap();
        assert_eq!(Command::unpack_command(&packed).unwrap(), ("echo".to_string(), args));
    }

    #[test]
    fn reply_error_surfaces_as_remote() {
        let packed =
            Command::pack_reply(Err(RemoteError::new(ErrorCode::TskMissing, "no tsk"))).unwrap();
        assert_eq!(
            Command::unpack(&packed),
            Err(CallError::Remote(RemoteError::new(ErrorCode::TskMissing, "no tsk")))
        );
    }

    #[test]
    fn reply_without_result_is_empty_map() {
        let packed = to_bytes(&ReplyEnvelope { result: None, error: None }).unwrap();
        assert_eq!(Command::unpack(&packed).unwrap(), empty_map());
    }

    #[test]
    fn garbage_reply_is_codec_error() {
        assert!(matches!(Command::unpack(&[0xFF, 0x01]), Err(CallError::Codec(_))));
    }
}

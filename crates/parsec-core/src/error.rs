//! Session error types

use parsec_crypto::CryptoError;
use thiserror::Error;

use crate::{
    pow::PowError,
    rpc::{CallError, RemoteError},
    storage::StorageError,
};

/// Errors surfaced by [`Session`](crate::Session) operations.
///
/// `Clone` because one negotiation outcome is shared by every caller
/// awaiting the endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The service rejected the operation
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The service could not be reached
    ///
    /// Never recovered locally: an unreachable service must not cause key
    /// regeneration.
    #[error("transport error: {0}")]
    Transport(String),

    /// Service identity or reply integrity could not be confirmed
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Bounded provisioning gave up
    #[error("session provisioning failed after {attempts} attempts: {reason}")]
    ProvisioningFailed {
        /// Attempts made before giving up
        attempts: u32,
        /// What kept failing
        reason: String,
    },

    /// Persisted state could not be read or written
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Key generation, signing, or sealing failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// POW task could not be solved
    #[error("POW error: {0}")]
    Pow(#[from] PowError),

    /// A message could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// The key address provider failed
    #[error("key address provider failed: {0}")]
    AddressProvider(String),

    /// The negotiation was cancelled
    #[error("session negotiation cancelled")]
    Cancelled,

    /// The session was killed; the next use negotiates a new one
    #[error("session was killed")]
    Killed,
}

impl SessionError {
    /// Structured remote rejection, if this is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }

    /// Whether this is a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<CallError> for SessionError {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Remote(remote) => Self::Remote(remote),
            CallError::Transport(reason) => Self::Transport(reason),
            CallError::Codec(reason) => Self::Codec(reason),
            CallError::Authentication(reason) => Self::Authentication(reason),
        }
    }
}

//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by key handling, sealing and signed records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key bytes have the wrong length or are not a valid curve point
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// What was wrong with the key
        reason: String,
    },

    /// AEAD authentication failed (wrong key or tampered ciphertext)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure detail
        reason: String,
    },

    /// Signature does not verify against the embedded signer key
    #[error("invalid signature")]
    InvalidSignature,

    /// Encoded structure could not be parsed
    #[error("malformed data: {0}")]
    Malformed(String),

    /// Requested asymmetric key strength is not usable
    #[error("unsupported key strength {requested}")]
    UnsupportedStrength {
        /// Strength requested by the caller
        requested: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_detail() {
        let err = CryptoError::UnsupportedStrength { requested: 0 };
        assert_eq!(err.to_string(), "unsupported key strength 0");

        let err = CryptoError::DecryptionFailed { reason: "authentication failed".to_string() };
        assert!(err.to_string().contains("authentication failed"));
    }
}

//! Signed records.
//!
//! A signed record bundles a payload with an anti-replay nonce, the signer's
//! public key, and an Ed25519 signature over all three. Anyone can unpack
//! and verify a record; the signer's identity is recovered from the record
//! itself, so trust decisions are made by comparing
//! [`SignedRecord::signer_address`] against known addresses.

use serde::{Deserialize, Serialize};

use crate::{
    address::KeyAddress,
    error::CryptoError,
    keys::{PrivateKey, PublicKey},
};

/// Domain separation for record signatures
const RECORD_SIGNATURE_DOMAIN: &[u8] = b"parsec signed record v1|";

/// CBOR layout on the wire.
#[derive(Serialize, Deserialize)]
struct RecordEnvelope {
    #[serde(with = "serde_bytes")]
    signer: Vec<u8>,
    #[serde(with = "serde_bytes")]
    nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    #[serde(with = "serde_bytes")]
    signature: Vec<u8>,
}

/// A verified signed record.
///
/// Instances only exist after signature verification succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRecord {
    signer: PublicKey,
    nonce: Vec<u8>,
    payload: Vec<u8>,
}

impl SignedRecord {
    /// Sign `payload` and `nonce` with `key` and encode the record.
    ///
    /// # Errors
    ///
    /// - `Malformed` if CBOR encoding fails
    pub fn pack_with_key(
        key: &PrivateKey,
        payload: &[u8],
        nonce: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let signer = key.public_key().to_bytes();
        let signature = key.sign(&signed_message(&signer, nonce, payload));

        let envelope = RecordEnvelope {
            signer: signer.to_vec(),
            nonce: nonce.to_vec(),
            payload: payload.to_vec(),
            signature,
        };

        let mut encoded = Vec::new();
        ciborium::into_writer(&envelope, &mut encoded)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok(encoded)
    }

    /// Decode a record and verify its signature.
    ///
    /// # Errors
    ///
    /// - `Malformed` if the bytes are not a record
    /// - `InvalidKey` if the embedded signer key is invalid
    /// - `InvalidSignature` if the signature does not verify
    pub fn unpack(bytes: &[u8]) -> Result<Self, CryptoError> {
        let envelope: RecordEnvelope =
            ciborium::from_reader(bytes).map_err(|e| CryptoError::Malformed(e.to_string()))?;

        let signer = PublicKey::from_bytes(&envelope.signer)?;
        signer.verify(
            &signed_message(&envelope.signer, &envelope.nonce, &envelope.payload),
            &envelope.signature,
        )?;

        Ok(Self { signer, nonce: envelope.nonce, payload: envelope.payload })
    }

    /// Signed payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Anti-replay nonce the signer attached.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Public key of the signer.
    pub fn signer(&self) -> &PublicKey {
        &self.signer
    }

    /// Address of the signer.
    pub fn signer_address(&self) -> KeyAddress {
        self.signer.address()
    }

    /// Consume the record, returning the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Length-prefixes the signer and nonce so field boundaries are unambiguous.
fn signed_message(signer: &[u8], nonce: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(
        RECORD_SIGNATURE_DOMAIN.len() + 8 + signer.len() + nonce.len() + payload.len(),
    );
    message.extend_from_slice(RECORD_SIGNATURE_DOMAIN);
    message.extend_from_slice(&(signer.len() as u32).to_be_bytes());
    message.extend_from_slice(signer);
    message.extend_from_slice(&(nonce.len() as u32).to_be_bytes());
    message.extend_from_slice(nonce);
    message.extend_from_slice(payload);
    message
}

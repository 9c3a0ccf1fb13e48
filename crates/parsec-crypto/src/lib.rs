//! Parsec Cryptographic Primitives
//!
//! Cryptographic building blocks for Parsec sessions. Pure functions with
//! deterministic outputs. Callers provide random bytes (key seeds, nonces,
//! ephemeral secrets) for deterministic testing.
//!
//! # Key Hierarchy
//!
//! A client owns one long-lived Service Connection Key (SCK). The service
//! exchanges a valid SCK for a short-lived symmetric Temporary Session Key
//! (TSK), which protects all authenticated traffic.
//!
//! ```text
//! SCK (PrivateKey: Ed25519 + X25519)
//!        │  signs createTSK requests
//!        │  opens grants sealed to it
//!        ▼
//! TSK (SymmetricKey: XChaCha20-Poly1305)
//!        │
//!        ▼
//! Endpoint traffic
//! ```
//!
//! # Security
//!
//! Authenticity:
//! - `SignedRecord` binds payload and nonce to the signer's public key
//! - The signer's `KeyAddress` is recoverable from the record and compared
//!   against the set of trusted service addresses by the caller
//!
//! Confidentiality:
//! - Grants are sealed to the SCK with an ephemeral X25519 exchange,
//!   HKDF-SHA256 and XChaCha20-Poly1305
//! - Session traffic is sealed with the TSK
//! - Failed authentication tag -> reject
//!
//! Key material is zeroized on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod address;
mod error;
mod keys;
mod sealed;
mod signed_record;
mod symmetric;

pub use address::{KEY_ADDRESS_SIZE, KeyAddress};
pub use error::CryptoError;
pub use keys::{
    KEY_SEED_SIZE, PACKED_PRIVATE_KEY_SIZE, PACKED_PUBLIC_KEY_SIZE, PrivateKey, PublicKey,
};
pub use sealed::{EPHEMERAL_SEED_SIZE, SEALED_OVERHEAD};
pub use signed_record::SignedRecord;
pub use symmetric::{NONCE_SIZE, SYMMETRIC_KEY_SIZE, SymmetricKey, TAG_SIZE};

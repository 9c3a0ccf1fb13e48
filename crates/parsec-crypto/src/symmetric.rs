//! Symmetric encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - the nonce must be provided by the caller.
//! Sealed output layout: `nonce (24) || ciphertext || tag (16)`.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Symmetric key size (32 bytes)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// A 32-byte symmetric key (used as the TSK).
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    key: [u8; SYMMETRIC_KEY_SIZE],
}

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn new(key: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Build a key from a byte slice.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if the slice is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SYMMETRIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKey {
                reason: format!("expected {SYMMETRIC_KEY_SIZE} bytes, got {}", bytes.len()),
            })?;
        Ok(Self { key })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.key
    }

    /// Encrypt and authenticate `plaintext` under this key.
    pub fn seal(&self, plaintext: &[u8], nonce: [u8; NONCE_SIZE]) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());

        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        sealed
    }

    /// Verify and decrypt data produced by [`SymmetricKey::seal`].
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the data is truncated, the key is wrong or the
    ///   ciphertext was tampered with
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed {
                reason: format!("sealed data too short: {} bytes", sealed.len()),
            });
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new((&self.key).into());

        cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| {
            CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
        })
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey").finish_non_exhaustive()
    }
}

// Implement Drop to zeroize key material
impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

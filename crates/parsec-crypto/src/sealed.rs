//! Public-key sealing.
//!
//! Ephemeral X25519 exchange with the recipient's static key, HKDF-SHA256 to
//! derive a one-time symmetric key, then `XChaCha20-Poly1305`.
//!
//! Layout: `ephemeral public key (32) || nonce (24) || ciphertext || tag (16)`.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as ExchangePublic, StaticSecret};

use crate::{
    error::CryptoError,
    symmetric::{NONCE_SIZE, SYMMETRIC_KEY_SIZE, SymmetricKey, TAG_SIZE},
};

/// Ephemeral secret seed size
pub const EPHEMERAL_SEED_SIZE: usize = 32;

/// Bytes added by sealing on top of the plaintext length
pub const SEALED_OVERHEAD: usize = 32 + NONCE_SIZE + TAG_SIZE;

/// Domain separation for the derived key
const SEAL_INFO: &[u8] = b"parsec sealed box v1";

pub(crate) fn seal(
    recipient: &ExchangePublic,
    plaintext: &[u8],
    ephemeral_seed: [u8; EPHEMERAL_SEED_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> Vec<u8> {
    let ephemeral = StaticSecret::from(ephemeral_seed);
    let ephemeral_public = ExchangePublic::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let key = derive_key(shared.as_bytes(), &ephemeral_public, recipient);

    let mut sealed = Vec::with_capacity(SEALED_OVERHEAD + plaintext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&key.seal(plaintext, nonce));
    sealed
}

pub(crate) fn open(recipient: &StaticSecret, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEALED_OVERHEAD {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("sealed payload too short: {} bytes", sealed.len()),
        });
    }

    let (ephemeral_bytes, body) = sealed.split_at(32);
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_public = ExchangePublic::from(ephemeral);

    let shared = recipient.diffie_hellman(&ephemeral_public);
    let key = derive_key(shared.as_bytes(), &ephemeral_public, &ExchangePublic::from(recipient));

    key.open(body)
}

/// Salt binds the derived key to both public keys.
fn derive_key(
    shared: &[u8; 32],
    ephemeral_public: &ExchangePublic,
    recipient: &ExchangePublic,
) -> SymmetricKey {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = [0u8; SYMMETRIC_KEY_SIZE];
    let Ok(()) = hkdf.expand(SEAL_INFO, &mut okm) else {
        unreachable!("HKDF-SHA256 can always expand 32 bytes");
    };

    SymmetricKey::new(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_is_constant() {
        let secret = StaticSecret::from([3u8; 32]);
        let public = ExchangePublic::from(&secret);

        for len in [0usize, 1, 100, 4096] {
            let sealed = seal(&public, &vec![0x42; len], [1u8; 32], [2u8; NONCE_SIZE]);
            assert_eq!(sealed.len(), len + SEALED_OVERHEAD);
        }
    }

    #[test]
    fn open_rejects_truncated_payload() {
        let secret = StaticSecret::from([3u8; 32]);
        assert!(open(&secret, &[0u8; SEALED_OVERHEAD - 1]).is_err());
    }

    #[test]
    fn tampered_ephemeral_key_fails() {
        let secret = StaticSecret::from([3u8; 32]);
        let public = ExchangePublic::from(&secret);
        let mut sealed = seal(&public, b"grant", [1u8; 32], [2u8; NONCE_SIZE]);
        sealed[0] ^= 0x80;

        assert!(open(&secret, &sealed).is_err());
    }
}

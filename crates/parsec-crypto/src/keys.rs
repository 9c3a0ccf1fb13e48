//! Asymmetric keys.
//!
//! A [`PrivateKey`] pairs an Ed25519 signing key with an X25519 static
//! secret so one key can both sign records and open payloads sealed to it.
//! Keys are derived from caller-provided seed bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey as ExchangePublic, StaticSecret};

use crate::{address::KeyAddress, error::CryptoError, sealed, symmetric::NONCE_SIZE};

/// Seed size for key generation (32 bytes signing + 32 bytes exchange)
pub const KEY_SEED_SIZE: usize = 64;

/// Packed private key size
pub const PACKED_PRIVATE_KEY_SIZE: usize = 64;

/// Packed public key size
pub const PACKED_PUBLIC_KEY_SIZE: usize = 64;

/// Private half of an SCK or service key.
pub struct PrivateKey {
    signing: SigningKey,
    exchange: StaticSecret,
}

impl PrivateKey {
    /// Generate a key of the requested strength from seed bytes.
    ///
    /// Strength is expressed in RSA-equivalent modulus bits. Every nonzero
    /// strength maps onto the same Curve25519 key pair.
    ///
    /// Callers MUST provide cryptographically secure seed bytes in
    /// production.
    ///
    /// # Errors
    ///
    /// - `UnsupportedStrength` if `strength` is zero
    pub fn generate(strength: u32, seed: &[u8; KEY_SEED_SIZE]) -> Result<Self, CryptoError> {
        if strength == 0 {
            return Err(CryptoError::UnsupportedStrength { requested: strength });
        }
        Ok(Self::from_seed(seed))
    }

    /// Derive a key from seed bytes without a strength check.
    pub fn from_seed(seed: &[u8; KEY_SEED_SIZE]) -> Self {
        let mut signing = [0u8; 32];
        let mut exchange = [0u8; 32];
        signing.copy_from_slice(&seed[..32]);
        exchange.copy_from_slice(&seed[32..]);

        Self { signing: SigningKey::from_bytes(&signing), exchange: StaticSecret::from(exchange) }
    }

    /// Public half of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying: self.signing.verifying_key(),
            exchange: ExchangePublic::from(&self.exchange),
        }
    }

    /// Address of the public half.
    pub fn address(&self) -> KeyAddress {
        self.public_key().address()
    }

    /// Serialize the secret material.
    pub fn pack(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(PACKED_PRIVATE_KEY_SIZE);
        packed.extend_from_slice(&self.signing.to_bytes());
        packed.extend_from_slice(&self.exchange.to_bytes());
        packed
    }

    /// Restore a key serialized with [`PrivateKey::pack`].
    ///
    /// # Errors
    ///
    /// - `InvalidKey` if the data is not exactly 64 bytes
    pub fn unpack(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: &[u8; KEY_SEED_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKey {
            reason: format!("packed private key must be {PACKED_PRIVATE_KEY_SIZE} bytes"),
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// Open a payload sealed to this key's public half.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the payload was sealed to another key or
    ///   tampered with
    pub fn open(&self, sealed_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        sealed::open(&self.exchange, sealed_data)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").field("address", &self.address()).finish_non_exhaustive()
    }
}

/// Public half of an SCK or service key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying: VerifyingKey,
    exchange: ExchangePublic,
}

impl PublicKey {
    /// Serialize the public key (verifying key || exchange key).
    pub fn to_bytes(&self) -> [u8; PACKED_PUBLIC_KEY_SIZE] {
        let mut packed = [0u8; PACKED_PUBLIC_KEY_SIZE];
        packed[..32].copy_from_slice(self.verifying.as_bytes());
        packed[32..].copy_from_slice(self.exchange.as_bytes());
        packed
    }

    /// Parse a serialized public key.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` on a wrong length or an invalid Ed25519 point
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PACKED_PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKey {
                reason: format!(
                    "packed public key must be {PACKED_PUBLIC_KEY_SIZE} bytes, got {}",
                    bytes.len()
                ),
            });
        }

        let mut verifying = [0u8; 32];
        let mut exchange = [0u8; 32];
        verifying.copy_from_slice(&bytes[..32]);
        exchange.copy_from_slice(&bytes[32..]);

        let verifying = VerifyingKey::from_bytes(&verifying)
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;

        Ok(Self { verifying, exchange: ExchangePublic::from(exchange) })
    }

    /// Address of this key.
    pub fn address(&self) -> KeyAddress {
        KeyAddress::of(&self.to_bytes())
    }

    /// Verify a signature over `message`.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the signature is malformed or does not verify
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let signature =
            Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
        self.verifying.verify_strict(message, &signature).map_err(|_| CryptoError::InvalidSignature)
    }

    /// Seal `plaintext` so only the matching private key can open it.
    ///
    /// `ephemeral_seed` and `nonce` MUST be fresh random bytes in production.
    pub fn seal(
        &self,
        plaintext: &[u8],
        ephemeral_seed: [u8; sealed::EPHEMERAL_SEED_SIZE],
        nonce: [u8; NONCE_SIZE],
    ) -> Vec<u8> {
        sealed::seal(&self.exchange, plaintext, ephemeral_seed, nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(byte: u8) -> [u8; KEY_SEED_SIZE] {
        [byte; KEY_SEED_SIZE]
    }

    #[test]
    fn generate_checks_strength() {
        assert!(matches!(
            PrivateKey::generate(0, &seed(1)),
            Err(CryptoError::UnsupportedStrength { requested: 0 })
        ));
    }

    #[test]
    fn every_strength_yields_the_same_key() {
        let expected = PrivateKey::from_seed(&seed(1)).public_key();
        for strength in [1, 1024, 2048, 3072, 4096, 8192, u32::MAX] {
            let key = PrivateKey::generate(strength, &seed(1)).unwrap();
            assert_eq!(key.public_key(), expected, "strength {strength}");
        }
    }

    #[test]
    fn pack_unpack_preserves_identity() {
        let key = PrivateKey::from_seed(&seed(7));
        let restored = PrivateKey::unpack(&key.pack()).unwrap();

        assert_eq!(key.public_key(), restored.public_key());
        assert_eq!(key.address(), restored.address());
    }

    #[test]
    fn unpack_rejects_wrong_length() {
        assert!(PrivateKey::unpack(&[0u8; 63]).is_err());
    }

    #[test]
    fn distinct_seeds_give_distinct_addresses() {
        let a = PrivateKey::from_seed(&seed(1));
        let b = PrivateKey::from_seed(&seed(2));
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn signature_verifies_only_for_signed_message() {
        let key = PrivateKey::from_seed(&seed(3));
        let public = key.public_key();
        let signature = key.sign(b"createTSK");

        assert!(public.verify(b"createTSK", &signature).is_ok());
        assert_eq!(public.verify(b"createTSL", &signature), Err(CryptoError::InvalidSignature));
        assert_eq!(public.verify(b"createTSK", &signature[1..]), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn public_key_bytes_roundtrip() {
        let public = PrivateKey::from_seed(&seed(4)).public_key();
        assert_eq!(PublicKey::from_bytes(&public.to_bytes()).unwrap(), public);
        assert!(PublicKey::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn sealed_payload_opens_with_recipient_only() {
        let recipient = PrivateKey::from_seed(&seed(5));
        let other = PrivateKey::from_seed(&seed(6));

        let sealed = recipient.public_key().seal(b"TSK grant", [9u8; 32], [1u8; NONCE_SIZE]);

        assert_eq!(recipient.open(&sealed).unwrap(), b"TSK grant");
        assert!(other.open(&sealed).is_err());
    }
}

//! Key addresses: stable digests identifying public keys.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha384};

use crate::error::CryptoError;

/// Key address size (SHA-384 digest, 48 bytes)
pub const KEY_ADDRESS_SIZE: usize = 48;

/// Address of a public key.
///
/// Two keys have the same address iff their packed public keys are equal.
/// Addresses are what the client compares when deciding whether a signed
/// response came from the genuine service.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ByteBuf", into = "ByteBuf")]
pub struct KeyAddress(Vec<u8>);

impl KeyAddress {
    /// Address of the given packed public key bytes.
    pub fn of(packed_public_key: &[u8]) -> Self {
        Self(Sha384::digest(packed_public_key).to_vec())
    }

    /// Parse an address from raw bytes.
    ///
    /// # Errors
    ///
    /// - `Malformed` if the slice is not exactly 48 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_ADDRESS_SIZE {
            return Err(CryptoError::Malformed(format!(
                "key address must be {KEY_ADDRESS_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<ByteBuf> for KeyAddress {
    type Error = CryptoError;

    fn try_from(bytes: ByteBuf) -> Result<Self, Self::Error> {
        let bytes = bytes.into_vec();
        if bytes.len() != KEY_ADDRESS_SIZE {
            return Err(CryptoError::Malformed(format!(
                "key address must be {KEY_ADDRESS_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }
}

impl From<KeyAddress> for ByteBuf {
    fn from(address: KeyAddress) -> Self {
        ByteBuf::from(address.0)
    }
}

impl std::fmt::Debug for KeyAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyAddress(")?;
        for byte in self.0.iter().take(6) {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

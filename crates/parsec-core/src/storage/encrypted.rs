//! Encrypted storage proxy.
//!
//! Values are sealed with a [`SymmetricKey`] and keys are replaced by
//! `SHA3-384(prefix || key || postfix)` so the underlying store reveals
//! neither slot names nor contents. The random prefix/postfix live in an
//! initializer record sealed under the same key, stored under a fixed slot:
//!
//! ```text
//! ._$EnCsT$._init        -> hex(seal(CBOR {version, keyPrefix, keyPostfix}))
//! ._$EnCsT$._<hex hash>  -> hex(seal(value))
//! ```
//!
//! Opening a store initialised with another key fails instead of silently
//! mixing two key sets.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use parsec_crypto::{NONCE_SIZE, SymmetricKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_384};

use super::{SessionStorage, StorageError};

/// Prefix of every slot written by the encrypted storage
const PLAIN_PREFIX: &str = "._$EnCsT$._";

/// Initializer format version
const INITIALIZER_VERSION: u32 = 1;

/// Size of the random key prefix and postfix
const KEY_SALT_SIZE: usize = 32;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Initializer {
    version: u32,
    #[serde(with = "serde_bytes")]
    key_prefix: Vec<u8>,
    #[serde(with = "serde_bytes")]
    key_postfix: Vec<u8>,
}

/// Storage proxy that encrypts keys and values on the fly.
///
/// Decrypted values and transformed keys are cached in memory.
#[derive(Clone)]
pub struct EncryptedStorage<S: SessionStorage> {
    inner: S,
    key: Arc<SymmetricKey>,
    prefix: Arc<[u8]>,
    postfix: Arc<[u8]>,
    cache: Arc<Mutex<Cache>>,
}

#[derive(Default)]
struct Cache {
    keys: HashMap<String, String>,
    values: HashMap<String, String>,
}

impl<S: SessionStorage> EncryptedStorage<S> {
    /// Open existing or create new encrypted storage over `inner`.
    ///
    /// # Errors
    ///
    /// - `Crypto` if `inner` holds an initializer sealed with another key
    /// - `Serialization` if the initializer is corrupt
    /// - `Io` if `inner` fails or the OS RNG is unavailable
    pub fn open(inner: S, key: SymmetricKey) -> Result<Self, StorageError> {
        let initializer = match inner.get_item(&initializer_slot())? {
            Some(packed) => {
                let sealed = hex::decode(packed)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let plain = key.open(&sealed).map_err(|_| {
                    StorageError::Crypto("encrypted storage belongs to another key".to_string())
                })?;
                let initializer: Initializer = ciborium::from_reader(plain.as_slice())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                if initializer.version != INITIALIZER_VERSION {
                    return Err(StorageError::Serialization(format!(
                        "unsupported encrypted storage version {}",
                        initializer.version
                    )));
                }
                initializer
            },
            None => {
                let initializer = Initializer {
                    version: INITIALIZER_VERSION,
                    key_prefix: random_vec(KEY_SALT_SIZE)?,
                    key_postfix: random_vec(KEY_SALT_SIZE)?,
                };
                let mut plain = Vec::new();
                ciborium::into_writer(&initializer, &mut plain)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let sealed = key.seal(&plain, random_nonce()?);
                inner.set_item(&initializer_slot(), &hex::encode(sealed))?;
                initializer
            },
        };

        Ok(Self {
            inner,
            key: Arc::new(key),
            prefix: initializer.key_prefix.into(),
            postfix: initializer.key_postfix.into(),
            cache: Arc::new(Mutex::new(Cache::default())),
        })
    }

    /// Whether `storage` already holds an encrypted storage.
    ///
    /// When true, [`EncryptedStorage::open`] only succeeds with the key that
    /// created it.
    pub fn exists_in(storage: &impl SessionStorage) -> Result<bool, StorageError> {
        storage.has_item(&initializer_slot())
    }

    /// Underlying storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    #[allow(clippy::expect_used)]
    fn transform_key(&self, key: &str) -> String {
        let mut cache = self.cache.lock().expect("Mutex poisoned");
        cache
            .keys
            .entry(key.to_string())
            .or_insert_with(|| {
                let mut hasher = Sha3_384::new();
                hasher.update(&self.prefix);
                hasher.update(key.as_bytes());
                hasher.update(&self.postfix);
                format!("{PLAIN_PREFIX}{}", hex::encode(hasher.finalize()))
            })
            .clone()
    }

    #[allow(clippy::expect_used)]
    fn cached_value(&self, key: &str) -> Option<String> {
        self.cache.lock().expect("Mutex poisoned").values.get(key).cloned()
    }

    #[allow(clippy::expect_used)]
    fn cache_value(&self, key: &str, value: Option<&str>) {
        let mut cache = self.cache.lock().expect("Mutex poisoned");
        match value {
            Some(value) => {
                cache.values.insert(key.to_string(), value.to_string());
            },
            None => {
                cache.values.remove(key);
            },
        }
    }
}

impl<S: SessionStorage> SessionStorage for EncryptedStorage<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if let Some(value) = self.cached_value(key) {
            return Ok(Some(value));
        }
        let Some(encrypted) = self.inner.get_item(&self.transform_key(key))? else {
            return Ok(None);
        };

        let sealed =
            hex::decode(encrypted).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let plain = self.key.open(&sealed).map_err(|e| StorageError::Crypto(e.to_string()))?;
        let value =
            String::from_utf8(plain).map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.cache_value(key, Some(&value));
        Ok(Some(value))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sealed = self.key.seal(value.as_bytes(), random_nonce()?);
        self.inner.set_item(&self.transform_key(key), &hex::encode(sealed))?;
        self.cache_value(key, Some(value));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.cache_value(key, None);
        self.inner.remove_item(&self.transform_key(key))
    }
}

fn initializer_slot() -> String {
    format!("{PLAIN_PREFIX}init")
}

fn random_vec(len: usize) -> Result<Vec<u8>, StorageError> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(|e| StorageError::Io(e.to_string()))?;
    Ok(bytes)
}

fn random_nonce() -> Result<[u8; NONCE_SIZE], StorageError> {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::fill(&mut nonce).map_err(|e| StorageError::Io(e.to_string()))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn salted(prefix: u8, postfix: u8) -> EncryptedStorage<MemoryStorage> {
        EncryptedStorage {
            inner: MemoryStorage::new(),
            key: Arc::new(key(1)),
            prefix: vec![prefix; KEY_SALT_SIZE].into(),
            postfix: vec![postfix; KEY_SALT_SIZE].into(),
            cache: Arc::default(),
        }
    }

    #[test]
    fn slot_names_are_salted_sha3_384() {
        let storage = salted(7, 9);
        assert_eq!(
            storage.transform_key(".p1.SID"),
            format!(
                "{PLAIN_PREFIX}7c848cdd53c520f40a292b9eec8299218f2567657356cae8f344eb478c53e51d\
                 4c38b45b88609ff563d72dd41e52a602"
            )
        );
        assert_ne!(storage.transform_key(".p1.SID"), salted(9, 7).transform_key(".p1.SID"));
    }

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::new([byte; 32])
    }

    #[test]
    fn hides_keys_and_values() {
        let backing = MemoryStorage::new();
        let storage = EncryptedStorage::open(backing.clone(), key(1)).unwrap();

        storage.set_item(".p1.SID", "session-secret").unwrap();
        assert_eq!(storage.get_item(".p1.SID").unwrap().as_deref(), Some("session-secret"));

        let raw = backing.to_map();
        assert_eq!(raw.len(), 2);
        for (slot, value) in &raw {
            assert!(slot.starts_with(PLAIN_PREFIX));
            assert!(!slot.contains("SID"));
            assert!(!value.contains("session-secret"));
        }
    }

    #[test]
    fn reopen_with_same_key_reads_data() {
        let backing = MemoryStorage::new();
        EncryptedStorage::open(backing.clone(), key(2)).unwrap().set_item("k", "v").unwrap();

        assert!(EncryptedStorage::<MemoryStorage>::exists_in(&backing).unwrap());
        let reopened = EncryptedStorage::open(backing, key(2)).unwrap();
        assert_eq!(reopened.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn wrong_key_is_refused() {
        let backing = MemoryStorage::new();
        EncryptedStorage::open(backing.clone(), key(3)).unwrap();

        assert!(matches!(EncryptedStorage::open(backing, key(4)), Err(StorageError::Crypto(_))));
    }

    #[test]
    fn empty_store_has_no_encrypted_storage() {
        assert!(!EncryptedStorage::<MemoryStorage>::exists_in(&MemoryStorage::new()).unwrap());
    }

    #[test]
    fn remove_clears_cache_and_backing() {
        let backing = MemoryStorage::new();
        let storage = EncryptedStorage::open(backing.clone(), key(5)).unwrap();
        storage.set_item("k", "v").unwrap();
        storage.remove_item("k").unwrap();

        assert_eq!(storage.get_item("k").unwrap(), None);
        assert_eq!(backing.len(), 1);
    }
}

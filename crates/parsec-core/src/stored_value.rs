//! Read-through, write-through cache over one storage slot.
//!
//! ```text
//!            value()                      set(Some(v))      set(None) / clear()
//! Unloaded ──────────► Loaded(Option<T>) ───────────► Loaded(Some(v))  ─► Loaded(None)
//!    ▲                     │                         (slot written)       (slot removed)
//!    └──── refresh() ──────┘
//! ```
//!
//! An absent slot loads as `None`. Nothing is cached when decoding fails, so
//! the next access reads the slot again.

use crate::storage::{SessionStorage, StorageError};

/// Converts slot values to and from their stored string form.
pub trait StringCodec<T>: Send + Sync + 'static {
    /// Stored form of `value`.
    fn encode(&self, value: &T) -> Result<String, StorageError>;

    /// Parse a stored string.
    ///
    /// # Errors
    ///
    /// - `Serialization` if `raw` is not a valid encoding
    fn decode(&self, raw: &str) -> Result<T, StorageError>;
}

/// Stores strings verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl StringCodec<String> for PlainText {
    fn encode(&self, value: &String) -> Result<String, StorageError> {
        Ok(value.clone())
    }

    fn decode(&self, raw: &str) -> Result<String, StorageError> {
        Ok(raw.to_string())
    }
}

/// Cached value persisted in a single storage slot.
pub struct StoredValue<S, T, C> {
    storage: S,
    key: String,
    codec: C,
    /// `None` until loaded, then the slot contents
    cached: Option<Option<T>>,
}

impl<S, T, C> StoredValue<S, T, C>
where
    S: SessionStorage,
    T: Clone,
    C: StringCodec<T>,
{
    /// Cached view of slot `key`. Nothing is read until first access.
    pub fn new(storage: S, key: impl Into<String>, codec: C) -> Self {
        Self { storage, key: key.into(), codec, cached: None }
    }

    /// Slot name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value, loading the slot on first access.
    ///
    /// # Errors
    ///
    /// - Storage errors from reading the slot
    /// - `Serialization` if the slot cannot be decoded (not cached)
    pub fn value(&mut self) -> Result<Option<T>, StorageError> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }
        let loaded = match self.storage.get_item(&self.key)? {
            Some(raw) => Some(self.codec.decode(&raw)?),
            None => None,
        };
        self.cached = Some(loaded.clone());
        Ok(loaded)
    }

    /// Whether the slot holds a value.
    pub fn is_defined(&mut self) -> Result<bool, StorageError> {
        Ok(self.value()?.is_some())
    }

    /// Write `Some(value)` to the slot or remove it for `None`.
    ///
    /// The cache is only updated once storage accepted the change.
    pub fn set(&mut self, value: Option<T>) -> Result<(), StorageError> {
        match &value {
            Some(value) => {
                let encoded = self.codec.encode(value)?;
                self.storage.set_item(&self.key, &encoded)?;
            },
            None => self.storage.remove_item(&self.key)?,
        }
        self.cached = Some(value);
        Ok(())
    }

    /// Remove the slot.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.set(None)
    }

    /// Forget the cached value; the next access reloads the slot.
    pub fn refresh(&mut self) {
        self.cached = None;
    }

    /// Drop the cached value without touching storage, used after a slot
    /// failed to decode.
    pub(crate) fn forget(&mut self) {
        self.cached = Some(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    /// Decimal codec that rejects anything else
    struct Decimal;

    impl StringCodec<u32> for Decimal {
        fn encode(&self, value: &u32) -> Result<String, StorageError> {
            Ok(value.to_string())
        }

        fn decode(&self, raw: &str) -> Result<u32, StorageError> {
            raw.parse().map_err(|_| StorageError::Serialization(format!("not a number: {raw}")))
        }
    }

    #[test]
    fn absent_slot_is_none() {
        let mut value = StoredValue::new(MemoryStorage::new(), "slot", Decimal);
        assert_eq!(value.value().unwrap(), None);
        assert!(!value.is_defined().unwrap());
    }

    #[test]
    fn set_writes_through() {
        let storage = MemoryStorage::new();
        let mut value = StoredValue::new(storage.clone(), "slot", Decimal);

        value.set(Some(42)).unwrap();
        assert_eq!(storage.get_item("slot").unwrap().as_deref(), Some("42"));
        assert_eq!(value.value().unwrap(), Some(42));

        value.clear().unwrap();
        assert_eq!(storage.get_item("slot").unwrap(), None);
        assert_eq!(value.value().unwrap(), None);
    }

    #[test]
    fn cache_hides_external_writes_until_refresh() {
        let storage = MemoryStorage::new();
        storage.set_item("slot", "1").unwrap();
        let mut value = StoredValue::new(storage.clone(), "slot", Decimal);

        assert_eq!(value.value().unwrap(), Some(1));
        storage.set_item("slot", "2").unwrap();
        assert_eq!(value.value().unwrap(), Some(1));

        value.refresh();
        assert_eq!(value.value().unwrap(), Some(2));
    }

    #[test]
    fn decode_failure_is_not_cached() {
        let storage = MemoryStorage::new();
        storage.set_item("slot", "garbage").unwrap();
        let mut value = StoredValue::new(storage.clone(), "slot", Decimal);

        assert!(matches!(value.value(), Err(StorageError::Serialization(_))));

        storage.set_item("slot", "7").unwrap();
        assert_eq!(value.value().unwrap(), Some(7));
    }

    #[test]
    fn plain_text_roundtrip() {
        let mut value = StoredValue::new(MemoryStorage::new(), ".p1.SID", PlainText);
        value.set(Some("session-1".to_string())).unwrap();
        value.refresh();
        assert_eq!(value.value().unwrap().as_deref(), Some("session-1"));
    }
}

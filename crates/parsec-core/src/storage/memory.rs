use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{SessionStorage, StorageError};

/// In-memory storage implementation for testing and simulation
///
/// All state is wrapped in Arc<Mutex<>> so clones share one map. Uses
/// `lock().expect()` which will panic if the mutex is poisoned.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage pre-populated with `items`.
    pub fn from_map(items: HashMap<String, String>) -> Self {
        Self { inner: Arc::new(Mutex::new(items)) }
    }

    /// Snapshot of every stored item.
    #[allow(clippy::expect_used)]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.inner.lock().expect("Mutex poisoned").clone()
    }

    /// Copy every item into `target`, overwriting existing keys there.
    pub fn copy_to(&self, target: &impl SessionStorage) -> Result<(), StorageError> {
        for (key, value) in self.to_map() {
            target.set_item(&key, &value)?;
        }
        Ok(())
    }

    /// Merge `items` into this storage, overwriting existing keys.
    #[allow(clippy::expect_used)]
    pub fn extend_from(&self, items: HashMap<String, String>) {
        self.inner.lock().expect("Mutex poisoned").extend(items);
    }

    /// Remove every item.
    #[allow(clippy::expect_used)]
    pub fn clear(&self) {
        self.inner.lock().expect("Mutex poisoned").clear();
    }

    /// Number of stored items.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }

    /// Whether the storage holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").get(key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").insert(key.to_string(), value.to_string());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item(".p1.SID").unwrap(), None);

        storage.set_item(".p1.SID", "session-1").unwrap();
        assert_eq!(storage.get_item(".p1.SID").unwrap().as_deref(), Some("session-1"));
        assert!(storage.has_item(".p1.SID").unwrap());

        storage.remove_item(".p1.SID").unwrap();
        assert_eq!(storage.get_item(".p1.SID").unwrap(), None);

        // Removing twice is fine
        storage.remove_item(".p1.SID").unwrap();
    }

    #[test]
    fn clones_share_state() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.set_item("k", "v").unwrap();
        assert_eq!(b.get_item("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn snapshot_and_merge() {
        let storage = MemoryStorage::new();
        storage.set_item("a", "1").unwrap();

        let other = MemoryStorage::from_map(storage.to_map());
        other.extend_from(HashMap::from([("b".to_string(), "2".to_string())]));

        assert_eq!(other.len(), 2);
        assert_eq!(storage.len(), 1);

        other.clear();
        assert!(other.is_empty());
    }

    #[test]
    fn copy_to_overwrites_target() {
        let source = MemoryStorage::new();
        source.set_item("a", "new").unwrap();
        let target = MemoryStorage::new();
        target.set_item("a", "old").unwrap();
        target.set_item("b", "kept").unwrap();

        source.copy_to(&target).unwrap();

        assert_eq!(target.get_item("a").unwrap().as_deref(), Some("new"));
        assert_eq!(target.get_item("b").unwrap().as_deref(), Some("kept"));
    }
}

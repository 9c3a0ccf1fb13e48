use std::sync::{Arc, Mutex};

use super::{MemoryStorage, SessionStorage, StorageError};

/// Memory cache in front of an optional underlying store.
///
/// Works in two modes:
///
/// - **Connected**: reads hit the cache first and fall through to the store
///   (filling the cache), writes and removals go to both.
/// - **Detached**: data accumulates in memory only. A session can start
///   before the user unlocks a protected store, and
///   [`CachedStorage::connect_to_storage`] later copies everything into it.
///
/// Once connected, access the underlying store only through this proxy.
#[derive(Clone)]
pub struct CachedStorage<S: SessionStorage> {
    cache: MemoryStorage,
    store: Arc<Mutex<Option<S>>>,
}

impl<S: SessionStorage> CachedStorage<S> {
    /// Cached proxy over `store`.
    pub fn new(store: S) -> Self {
        Self { cache: MemoryStorage::new(), store: Arc::new(Mutex::new(Some(store))) }
    }

    /// Memory-only storage waiting for a store to be connected.
    pub fn detached() -> Self {
        Self { cache: MemoryStorage::new(), store: Arc::new(Mutex::new(None)) }
    }

    /// Connect `store` as the underlying storage, copying every item
    /// accumulated so far into it.
    ///
    /// # Errors
    ///
    /// - `Io` if a store is already connected and `force_replace` is false
    /// - Any error the new store returns while items are copied; the
    ///   previous connection state is kept in that case
    #[allow(clippy::expect_used)]
    pub fn connect_to_storage(&self, store: S, force_replace: bool) -> Result<(), StorageError> {
        let mut current = self.store.lock().expect("Mutex poisoned");
        if current.is_some() && !force_replace {
            return Err(StorageError::Io("storage is already connected".to_string()));
        }
        self.cache.copy_to(&store)?;
        *current = Some(store);
        Ok(())
    }

    /// Detach the underlying store and drop every cached item.
    ///
    /// The store itself keeps its data.
    #[allow(clippy::expect_used)]
    pub fn disconnect(&self) {
        *self.store.lock().expect("Mutex poisoned") = None;
        self.cache.clear();
    }

    /// Whether an underlying store is connected.
    #[allow(clippy::expect_used)]
    pub fn is_connected(&self) -> bool {
        self.store.lock().expect("Mutex poisoned").is_some()
    }

    /// Drop every item accumulated in memory.
    ///
    /// # Errors
    ///
    /// - `Io` while a store is connected; [`CachedStorage::disconnect`] first
    pub fn clear(&self) -> Result<(), StorageError> {
        if self.is_connected() {
            return Err(StorageError::Io(
                "can't clear connected cached storage: disconnect it first".to_string(),
            ));
        }
        self.cache.clear();
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn store(&self) -> Option<S> {
        self.store.lock().expect("Mutex poisoned").clone()
    }
}

impl<S: SessionStorage> SessionStorage for CachedStorage<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if let Some(value) = self.cache.get_item(key)? {
            return Ok(Some(value));
        }
        let Some(store) = self.store() else {
            return Ok(None);
        };
        let value = store.get_item(key)?;
        if let Some(value) = &value {
            self.cache.set_item(key, value)?;
        }
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(store) = self.store() {
            store.set_item(key, value)?;
        }
        self.cache.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.cache.remove_item(key)?;
        if let Some(store) = self.store() {
            store.remove_item(key)?;
        }
        Ok(())
    }
}

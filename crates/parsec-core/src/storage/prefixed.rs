use super::{SessionStorage, StorageError};

/// Namespacing proxy: every key is prefixed before reaching the inner store.
///
/// Lets several sessions (or an SCK slot set per service) share one store.
#[derive(Clone)]
pub struct PrefixedStorage<S: SessionStorage> {
    inner: S,
    prefix: String,
}

impl<S: SessionStorage> PrefixedStorage<S> {
    /// Wrap `inner`, prefixing every key with `prefix`.
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self { inner, prefix: prefix.into() }
    }

    /// Key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Underlying storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl<S: SessionStorage> SessionStorage for PrefixedStorage<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_item(&self.key(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set_item(&self.key(key), value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(&self.key(key))
    }
}

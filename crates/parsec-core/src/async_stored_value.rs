//! Stored value with an asynchronous codec.
//!
//! Decoding key material can be expensive, so the in-flight or resolved
//! decode is cached as a shared future: concurrent readers await one decode
//! instead of starting their own. A decode that resolved to an error is
//! discarded on the next access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{self, BoxFuture, Shared},
};

use crate::storage::{SessionStorage, StorageError};

/// Asynchronous counterpart of [`StringCodec`](crate::StringCodec).
#[async_trait]
pub trait AsyncStringCodec<T>: Send + Sync + 'static {
    /// Stored form of `value`.
    async fn encode(&self, value: &T) -> Result<String, StorageError>;

    /// Parse a stored string.
    async fn decode(&self, raw: String) -> Result<T, StorageError>;
}

type Load<T> = Shared<BoxFuture<'static, Result<Option<T>, StorageError>>>;

/// Cached value persisted in a single storage slot, decoded asynchronously.
pub struct AsyncStoredValue<S, T, C> {
    storage: S,
    key: String,
    codec: Arc<C>,
    cached: Mutex<Option<Load<T>>>,
}

impl<S, T, C> AsyncStoredValue<S, T, C>
where
    S: SessionStorage,
    T: Clone + Send + Sync + 'static,
    C: AsyncStringCodec<T>,
{
    /// Cached view of slot `key`. Nothing is read until first access.
    pub fn new(storage: S, key: impl Into<String>, codec: C) -> Self {
        Self { storage, key: key.into(), codec: Arc::new(codec), cached: Mutex::new(None) }
    }

    /// Slot name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value, decoding the slot on first access.
    ///
    /// Concurrent callers share a single decode.
    pub async fn value(&self) -> Result<Option<T>, StorageError> {
        self.load().await
    }

    /// Write `Some(value)` to the slot or remove it for `None`.
    pub async fn set(&self, value: Option<T>) -> Result<(), StorageError> {
        match &value {
            Some(value) => {
                let encoded = self.codec.encode(value).await?;
                self.storage.set_item(&self.key, &encoded)?;
            },
            None => self.storage.remove_item(&self.key)?,
        }
        self.replace(Some(future::ready(Ok(value)).boxed().shared()));
        Ok(())
    }

    /// Remove the slot.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.set(None).await
    }

    /// Forget the cached value; the next access reloads the slot.
    pub fn refresh(&self) {
        self.replace(None);
    }

    /// Drop the cached value without touching storage, used after a slot
    /// failed to decode.
    pub(crate) fn forget(&self) {
        self.replace(Some(future::ready(Ok(None)).boxed().shared()));
    }

    #[allow(clippy::expect_used)]
    fn replace(&self, load: Option<Load<T>>) {
        *self.cached.lock().expect("Mutex poisoned") = load;
    }

    #[allow(clippy::expect_used)]
    fn load(&self) -> Load<T> {
        let mut cached = self.cached.lock().expect("Mutex poisoned");
        if let Some(load) = cached.as_ref()
            && !matches!(load.peek(), Some(Err(_)))
        {
            return load.clone();
        }

        let load = match self.storage.get_item(&self.key) {
            Ok(Some(raw)) => {
                let codec = Arc::clone(&self.codec);
                async move { codec.decode(raw).await.map(Some) }.boxed().shared()
            },
            Ok(None) => future::ready(Ok(None)).boxed().shared(),
            Err(error) => future::ready(Err(error)).boxed().shared(),
        };
        *cached = Some(load.clone());
        load
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::MemoryStorage;

    /// Decimal codec that counts decodes and yields once while decoding
    #[derive(Default)]
    struct SlowDecimal {
        decodes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AsyncStringCodec<u32> for SlowDecimal {
        async fn encode(&self, value: &u32) -> Result<String, StorageError> {
            Ok(value.to_string())
        }

        async fn decode(&self, raw: String) -> Result<u32, StorageError> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            raw.parse().map_err(|_| StorageError::Serialization(format!("not a number: {raw}")))
        }
    }

    type Slot = AsyncStoredValue<MemoryStorage, u32, SlowDecimal>;

    fn stored(storage: &MemoryStorage) -> (Slot, Arc<AtomicUsize>) {
        let codec = SlowDecimal::default();
        let decodes = Arc::clone(&codec.decodes);
        (AsyncStoredValue::new(storage.clone(), "slot", codec), decodes)
    }

    #[tokio::test]
    async fn concurrent_readers_share_one_decode() {
        let storage = MemoryStorage::new();
        storage.set_item("slot", "5").unwrap();
        let (value, decodes) = stored(&storage);

        let (a, b, c) = tokio::join!(value.value(), value.value(), value.value());
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (Some(5), Some(5), Some(5)));
        assert_eq!(decodes.load(Ordering::SeqCst), 1);

        assert_eq!(value.value().await.unwrap(), Some(5));
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn set_and_clear_write_through() {
        let storage = MemoryStorage::new();
        let (value, decodes) = stored(&storage);

        assert_eq!(value.value().await.unwrap(), None);
        value.set(Some(9)).await.unwrap();
        assert_eq!(storage.get_item("slot").unwrap().as_deref(), Some("9"));
        assert_eq!(value.value().await.unwrap(), Some(9));

        value.clear().await.unwrap();
        assert_eq!(storage.get_item("slot").unwrap(), None);
        assert_eq!(value.value().await.unwrap(), None);
        assert_eq!(decodes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_decode_is_retried() {
        let storage = MemoryStorage::new();
        storage.set_item("slot", "nope").unwrap();
        let (value, decodes) = stored(&storage);

        assert!(matches!(value.value().await, Err(StorageError::Serialization(_))));

        storage.set_item("slot", "3").unwrap();
        assert_eq!(value.value().await.unwrap(), Some(3));
        assert_eq!(decodes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_reloads() {
        let storage = MemoryStorage::new();
        storage.set_item("slot", "1").unwrap();
        let (value, _) = stored(&storage);

        assert_eq!(value.value().await.unwrap(), Some(1));
        storage.set_item("slot", "2").unwrap();
        assert_eq!(value.value().await.unwrap(), Some(1));

        value.refresh();
        assert_eq!(value.value().await.unwrap(), Some(2));
    }
}

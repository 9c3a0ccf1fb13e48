//! Session storage abstraction
//!
//! Persisted session state is a handful of string slots (`.p1.SCK`,
//! `.p1.TSK`, `.p1.SID`). The trait is synchronous: every backend is either
//! in-memory or a short local transaction, and the session never holds a
//! storage call across an await.
//!
//! Backends compose as proxies:
//!
//! ```text
//! Session ──► PrefixedStorage ──► CachedStorage ──► EncryptedStorage ──► RedbStorage
//!                                  (memory until          (hashed keys,
//!                                   connected)             sealed values)
//! ```

mod cached;
mod chaotic;
mod encrypted;
mod error;
mod memory;
mod prefixed;
mod redb;

pub use cached::CachedStorage;
pub use chaotic::ChaoticStorage;
pub use encrypted::EncryptedStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use prefixed::PrefixedStorage;

pub use self::redb::RedbStorage;

/// String key/value store backing the persisted session slots.
///
/// Must be Clone (shared by the session and its cached values), Send + Sync
/// (thread-safe), and synchronous (no async methods). Implementations share
/// internal state via Arc, so clones access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock).
pub trait SessionStorage: Clone + Send + Sync + 'static {
    /// Read a slot. `None` if the slot is absent.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a slot, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a slot. Removing an absent slot is a no-op.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Whether a slot is present.
    fn has_item(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get_item(key)?.is_some())
    }
}

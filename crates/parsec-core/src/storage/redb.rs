//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Session
//! credentials survive process restarts, so a restarted client reuses its
//! SCK/TSK/SessionId instead of paying for a new registration.

use std::{path::Path, sync::Arc};

use redb::{Database, TableDefinition};

use super::{SessionStorage, StorageError};

/// Table: session_items
/// Key: slot name (UTF-8)
/// Value: slot contents (UTF-8)
const SESSION_ITEMS: TableDefinition<&str, &str> = TableDefinition::new("session_items");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the SESSION_ITEMS table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(SESSION_ITEMS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl SessionStorage for RedbStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(SESSION_ITEMS).map_err(|e| StorageError::Io(e.to_string()))?;

        let value = table.get(key).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(value.map(|guard| guard.value().to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(SESSION_ITEMS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(key, value).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(SESSION_ITEMS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(key).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

//! Persisted session credentials: SCK, TSK and SessionId slots.
//!
//! A slot that no longer decodes is a local consistency failure: it is
//! logged, removed and read as absent. Changing or clearing the SessionId
//! clears the TSK, so a TSK is never left paired with another session.

use std::sync::Arc;

use async_trait::async_trait;
use parsec_crypto::{PrivateKey, SymmetricKey};

use crate::{
    async_stored_value::{AsyncStoredValue, AsyncStringCodec},
    storage::{SessionStorage, StorageError},
    stored_value::{PlainText, StoredValue, StringCodec},
};

/// Slot holding the packed SCK.
pub const SCK_SLOT: &str = ".p1.SCK";

/// Slot holding the TSK.
pub const TSK_SLOT: &str = ".p1.TSK";

/// Slot holding the SessionId.
pub const SESSION_ID_SLOT: &str = ".p1.SID";

/// Hex of the packed private key.
struct SckCodec;

#[async_trait]
impl AsyncStringCodec<Arc<PrivateKey>> for SckCodec {
    async fn encode(&self, value: &Arc<PrivateKey>) -> Result<String, StorageError> {
        Ok(hex::encode(value.pack()))
    }

    async fn decode(&self, raw: String) -> Result<Arc<PrivateKey>, StorageError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| StorageError::Serialization(format!("SCK is not hex: {e}")))?;
        let key = PrivateKey::unpack(&bytes)
            .map_err(|e| StorageError::Serialization(format!("SCK does not unpack: {e}")))?;
        Ok(Arc::new(key))
    }
}

/// Hex of the raw key bytes.
struct TskCodec;

impl StringCodec<SymmetricKey> for TskCodec {
    fn encode(&self, value: &SymmetricKey) -> Result<String, StorageError> {
        Ok(hex::encode(value.as_bytes()))
    }

    fn decode(&self, raw: &str) -> Result<SymmetricKey, StorageError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| StorageError::Serialization(format!("TSK is not hex: {e}")))?;
        SymmetricKey::from_slice(&bytes)
            .map_err(|e| StorageError::Serialization(format!("TSK has the wrong size: {e}")))
    }
}

pub(crate) struct Credentials<S> {
    storage: S,
    sck: AsyncStoredValue<S, Arc<PrivateKey>, SckCodec>,
    tsk: StoredValue<S, SymmetricKey, TskCodec>,
    session_id: StoredValue<S, String, PlainText>,
}

impl<S: SessionStorage> Credentials<S> {
    pub(crate) fn new(storage: S) -> Self {
        Self {
            sck: AsyncStoredValue::new(storage.clone(), SCK_SLOT, SckCodec),
            tsk: StoredValue::new(storage.clone(), TSK_SLOT, TskCodec),
            session_id: StoredValue::new(storage.clone(), SESSION_ID_SLOT, PlainText),
            storage,
        }
    }

    pub(crate) async fn sck(&mut self) -> Result<Option<Arc<PrivateKey>>, StorageError> {
        match self.sck.value().await {
            Err(StorageError::Serialization(reason)) => {
                self.drop_corrupt(SCK_SLOT, &reason)?;
                self.sck.forget();
                Ok(None)
            },
            loaded => loaded,
        }
    }

    pub(crate) async fn set_sck(&mut self, sck: Option<Arc<PrivateKey>>) -> Result<(), StorageError> {
        self.sck.set(sck).await
    }

    pub(crate) fn tsk(&mut self) -> Result<Option<SymmetricKey>, StorageError> {
        match self.tsk.value() {
            Err(StorageError::Serialization(reason)) => {
                self.drop_corrupt(TSK_SLOT, &reason)?;
                self.tsk.forget();
                Ok(None)
            },
            loaded => loaded,
        }
    }

    pub(crate) fn set_tsk(&mut self, tsk: Option<SymmetricKey>) -> Result<(), StorageError> {
        self.tsk.set(tsk)
    }

    pub(crate) fn session_id(&mut self) -> Result<Option<String>, StorageError> {
        self.session_id.value()
    }

    /// Replace the SessionId. A different id (or none) also clears the TSK.
    pub(crate) fn set_session_id(&mut self, session_id: Option<String>) -> Result<(), StorageError> {
        if self.session_id.value()? == session_id {
            return Ok(());
        }
        self.tsk.clear()?;
        self.session_id.set(session_id)
    }

    pub(crate) async fn clear_all(&mut self) -> Result<(), StorageError> {
        self.tsk.clear()?;
        self.session_id.clear()?;
        self.sck.clear().await
    }

    fn drop_corrupt(&self, slot: &str, reason: &str) -> Result<(), StorageError> {
        tracing::warn!(slot, reason, "dropping undecodable credential slot");
        self.storage.remove_item(slot)
    }
}

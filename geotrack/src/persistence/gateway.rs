//! Persistence Gateway - best-effort checkpoints.
//!
//! Every failure here is recovered locally: it is logged and the caller gets
//! an empty registry or no position. Writes are never retried and never roll
//! back the in-memory change that triggered them.

use std::sync::Arc;

use tracing::{debug, warn};

use super::codec::{Codec, JsonCodec};
use super::error::PersistenceError;
use super::storage::ByteStore;
use super::{DEFAULT_POSITION_KEY, DEFAULT_REGISTRY_KEY};
use crate::listener::ListenerRecord;
use crate::position::Position;

/// Saves and restores the listener registry and the last known position.
pub struct PersistenceGateway {
    store: Arc<dyn ByteStore>,
    codec: Arc<dyn Codec>,
    registry_key: String,
    position_key: String,
}

impl PersistenceGateway {
    /// Create a gateway with explicit keys.
    pub fn new(
        store: Arc<dyn ByteStore>,
        codec: Arc<dyn Codec>,
        registry_key: impl Into<String>,
        position_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            codec,
            registry_key: registry_key.into(),
            position_key: position_key.into(),
        }
    }

    /// JSON codec and the default keys.
    pub fn with_defaults(store: Arc<dyn ByteStore>) -> Self {
        Self::new(
            store,
            Arc::new(JsonCodec),
            DEFAULT_REGISTRY_KEY,
            DEFAULT_POSITION_KEY,
        )
    }

    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }

    pub fn position_key(&self) -> &str {
        &self.position_key
    }

    /// Write the registry checkpoint. Returns false if it was not written.
    pub fn save_registry(&self, records: &[ListenerRecord]) -> bool {
        match self.try_save_registry(records) {
            Ok(()) => {
                debug!(listeners = records.len(), "Saved listener registry");
                true
            }
            Err(e) => {
                warn!(error = %e, "Cannot save location listeners");
                false
            }
        }
    }

    /// Read the registry checkpoint, empty on any failure.
    pub fn load_registry(&self) -> Vec<ListenerRecord> {
        match self.try_load_registry() {
            Ok(Some(records)) => records,
            Ok(None) => {
                debug!(key = %self.registry_key, "No listener registry checkpoint");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Cannot get location listeners");
                Vec::new()
            }
        }
    }

    /// Write the last known position. Returns false if it was not written.
    pub fn save_position(&self, position: &Position) -> bool {
        match self.try_save_position(position) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cannot save location");
                false
            }
        }
    }

    /// Read the last known position, `None` on any failure.
    pub fn load_position(&self) -> Option<Position> {
        match self.try_load_position() {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "Cannot get location");
                None
            }
        }
    }

    pub fn try_save_registry(&self, records: &[ListenerRecord]) -> Result<(), PersistenceError> {
        let bytes = self.codec.encode_registry(records)?;
        self.write(&self.registry_key, &bytes)
    }

    pub fn try_load_registry(&self) -> Result<Option<Vec<ListenerRecord>>, PersistenceError> {
        self.read(&self.registry_key)?
            .map(|bytes| self.codec.decode_registry(&bytes))
            .transpose()
    }

    pub fn try_save_position(&self, position: &Position) -> Result<(), PersistenceError> {
        let bytes = self.codec.encode_position(position)?;
        self.write(&self.position_key, &bytes)
    }

    pub fn try_load_position(&self) -> Result<Option<Position>, PersistenceError> {
        self.read(&self.position_key)?
            .map(|bytes| self.codec.decode_position(&bytes))
            .transpose()
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.store.read(key).map_err(|source| PersistenceError::Read {
            key: key.to_string(),
            source,
        })
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.store
            .write(key, bytes)
            .map_err(|source| PersistenceError::Write {
                key: key.to_string(),
                source,
            })
    }
}

//! Listener capability and its persisted form.
//!
//! A [`PositionListener`] is the callback side of a registry entry. Callbacks
//! are never serialized. What survives a restart is a [`ListenerRecord`]: the
//! listener's name plus a reconstruction key (`kind` and `params`) that a
//! [`ListenerFactory`] turns back into a live callback.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;

/// A fault raised by a listener callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListenerError {
    /// The callback reported a failure.
    #[error("Listener failed: {0}")]
    Failed(String),

    /// The callback panicked.
    #[error("Listener panicked: {0}")]
    Panicked(String),
}

/// Receiver of position changes.
///
/// Callbacks run on the thread that delivers the event and must not block
/// for long. A callback may call back into the tracker (for example to
/// remove itself).
pub trait PositionListener: Send + Sync {
    /// Steady-state notification with the newest fix.
    fn on_position_changed(&self, current: &Position) -> Result<(), ListenerError>;

    /// Sent once after a restart: where the device was when the process
    /// stopped, and where it is now (if a current fix is known).
    fn on_position_delta(
        &self,
        previous: &Position,
        current: Option<&Position>,
    ) -> Result<(), ListenerError>;

    /// Reconstruction key used to rebuild this listener after a restart.
    fn kind(&self) -> &str;

    /// Extra reconstruction parameters persisted with the listener.
    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Persisted form of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRecord {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl ListenerRecord {
    /// Describe a live listener registered under `name`.
    pub fn describe(name: &str, listener: &dyn PositionListener) -> Self {
        Self {
            name: name.to_string(),
            kind: listener.kind().to_string(),
            params: listener.params(),
        }
    }
}

/// Rebuilds live listeners from persisted records.
pub trait ListenerFactory: Send + Sync {
    /// Returns `None` when the record's kind is unknown to this factory.
    fn restore(&self, record: &ListenerRecord) -> Option<Arc<dyn PositionListener>>;
}

impl<F> ListenerFactory for F
where
    F: Fn(&ListenerRecord) -> Option<Arc<dyn PositionListener>> + Send + Sync,
{
    fn restore(&self, record: &ListenerRecord) -> Option<Arc<dyn PositionListener>> {
        self(record)
    }
}

/// Run one callback, turning a panic into a [`ListenerError`].
pub(crate) fn invoke_isolated<F>(callback: F) -> Result<(), ListenerError>
where
    F: FnOnce() -> Result<(), ListenerError>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ListenerError::Panicked(message))
        }
    }
}

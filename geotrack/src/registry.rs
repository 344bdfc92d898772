//! Listener Registry - named subscribers to position changes.
//!
//! The registry maps a unique name to a live [`PositionListener`]. Entries
//! read back from storage whose callback could not be rebuilt are kept as
//! dormant [`ListenerRecord`]s: they are written back on every checkpoint so
//! the registration is not lost, and a later insert under the same name
//! replaces them.
//!
//! All access goes through one `RwLock`. Delivery never iterates the map
//! under the lock; it works on a [`snapshot`](ListenerRegistry::snapshot).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::listener::{ListenerFactory, ListenerRecord, PositionListener};

#[derive(Default)]
struct RegistryState {
    live: HashMap<String, Arc<dyn PositionListener>>,
    dormant: BTreeMap<String, ListenerRecord>,
}

/// Outcome of rebuilding the registry from persisted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreCounts {
    /// Records turned back into live listeners.
    pub restored: usize,
    /// Records kept without a callback.
    pub dormant: usize,
}

/// Thread-safe name → listener map.
#[derive(Default)]
pub struct ListenerRegistry {
    state: RwLock<RegistryState>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a live listener. Returns the replaced one.
    pub fn insert(
        &self,
        name: impl Into<String>,
        listener: Arc<dyn PositionListener>,
    ) -> Option<Arc<dyn PositionListener>> {
        let name = name.into();
        let mut state = self.state.write();
        state.dormant.remove(&name);
        state.live.insert(name, listener)
    }

    /// Remove a name, live or dormant. Returns true if anything was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut state = self.state.write();
        let live = state.live.remove(name).is_some();
        let dormant = state.dormant.remove(name).is_some();
        live || dormant
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PositionListener>> {
        self.state.read().live.get(name).cloned()
    }

    /// Live listeners as an owned map.
    pub fn listeners(&self) -> HashMap<String, Arc<dyn PositionListener>> {
        self.state.read().live.clone()
    }

    /// Consistent copy of the live entries, for delivery.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn PositionListener>)> {
        self.state
            .read()
            .live
            .iter()
            .map(|(name, listener)| (name.clone(), Arc::clone(listener)))
            .collect()
    }

    /// True when no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().live.is_empty()
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.state.read().live.len()
    }

    /// Sorted names of live listeners.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().live.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted names of dormant records.
    pub fn dormant_names(&self) -> Vec<String> {
        self.state.read().dormant.keys().cloned().collect()
    }

    /// Records for every entry, live and dormant, sorted by name.
    pub fn records(&self) -> Vec<ListenerRecord> {
        let (live, mut records): (Vec<_>, Vec<_>) = {
            let state = self.state.read();
            (
                state
                    .live
                    .iter()
                    .map(|(name, listener)| (name.clone(), Arc::clone(listener)))
                    .collect(),
                state.dormant.values().cloned().collect(),
            )
        };

        // Listener methods run outside the lock.
        records.extend(
            live.iter()
                .map(|(name, listener)| ListenerRecord::describe(name, listener.as_ref())),
        );
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Replace the registry contents with persisted records.
    ///
    /// Each record is offered to `factory`; the ones it cannot rebuild stay
    /// dormant. Duplicate names keep the last record.
    pub fn restore(
        &self,
        records: Vec<ListenerRecord>,
        factory: &dyn ListenerFactory,
    ) -> RestoreCounts {
        let mut live = HashMap::new();
        let mut dormant = BTreeMap::new();

        for record in records {
            match factory.restore(&record) {
                Some(listener) => {
                    dormant.remove(&record.name);
                    live.insert(record.name, listener);
                }
                None => {
                    tracing::warn!(
                        name = %record.name,
                        kind = %record.kind,
                        "No factory for persisted listener, keeping it dormant"
                    );
                    live.remove(&record.name);
                    dormant.insert(record.name.clone(), record);
                }
            }
        }

        let counts = RestoreCounts {
            restored: live.len(),
            dormant: dormant.len(),
        };

        let mut state = self.state.write();
        state.live = live;
        state.dormant = dormant;
        counts
    }
}

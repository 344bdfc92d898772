//! Location Tracker - the service object tying the core together.
//!
//! # Architecture
//!
//! ```text
//! PositionSource ──events──▶ TrackerSink ──▶ LocationTracker::handle_event
//!       ▲                                          │
//!       │ subscribe/unsubscribe                    ├─▶ UpdatePump ─▶ listeners
//!  ProviderSelector ◀── availability events ───────┘        │
//!                                                           ▼
//!                                               PersistenceGateway ─▶ ByteStore
//! ```
//!
//! The tracker is constructed explicitly and shared as `Arc<LocationTracker>`.
//! The source only holds a weak reference to it, so dropping the last `Arc`
//! tears the subscription down.
//!
//! # Usage
//!
//! ```ignore
//! let tracker = LocationTracker::from_config(&TrackerConfig::load()?, source);
//! let summary = tracker.restore(&factory);
//! tracker.add_listener("geofence", Arc::new(Geofence::new(30.0)))?;
//! ```

mod error;
mod events;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::listener::{invoke_isolated, ListenerFactory, PositionListener};
use crate::persistence::{FileStore, JsonCodec, PersistenceGateway};
use crate::position::{Criteria, Position, ProviderId};
use crate::pump::{DeliveryReport, UpdatePump};
use crate::registry::ListenerRegistry;
use crate::selector::{ProviderSelector, Selection};
use crate::source::{PositionSink, PositionSource, SourceEvent, SubscriptionParams};

pub use error::TrackerError;
pub use events::{spawn_event_loop, EventLoopStats};

/// What handling one source event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A fix was delivered to the listeners.
    Delivered(DeliveryReport),
    /// Provider selection ran and succeeded.
    Reselected(Selection),
    /// Provider selection ran and tracking is now inactive.
    TrackingInactive(TrackerError),
    /// Nothing to do (no listeners, or the event concerns another provider).
    Ignored,
}

/// Result of [`LocationTracker::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Listeners rebuilt from the checkpoint.
    pub restored: usize,
    /// Records kept dormant because no factory recognised them.
    pub dormant: usize,
    /// Provider selected after restoring, if any.
    pub provider: Option<ProviderId>,
    /// Why no provider could be selected.
    pub selection_error: Option<TrackerError>,
    /// Restart delta delivery.
    pub delta: DeliveryReport,
}

/// Tracks the device position for a registry of named listeners.
pub struct LocationTracker {
    registry: Arc<ListenerRegistry>,
    gateway: Arc<PersistenceGateway>,
    selector: ProviderSelector,
    pump: UpdatePump,
}

/// Sink handed to the position source.
struct TrackerSink {
    tracker: Weak<LocationTracker>,
}

impl PositionSink for TrackerSink {
    fn on_event(&self, event: SourceEvent) {
        match self.tracker.upgrade() {
            Some(tracker) => {
                tracker.handle_event(event);
            }
            None => debug!("Location tracker dropped, ignoring source event"),
        }
    }
}

impl LocationTracker {
    /// Create a tracker over `source`, checkpointing through `gateway`.
    pub fn new(
        source: Arc<dyn PositionSource>,
        gateway: PersistenceGateway,
        params: SubscriptionParams,
    ) -> Arc<Self> {
        Self::with_criteria(source, gateway, params, Criteria::default())
    }

    /// Like [`new`](Self::new), selecting providers by `criteria`.
    pub fn with_criteria(
        source: Arc<dyn PositionSource>,
        gateway: PersistenceGateway,
        params: SubscriptionParams,
        criteria: Criteria,
    ) -> Arc<Self> {
        let registry = Arc::new(ListenerRegistry::new());
        let gateway = Arc::new(gateway);

        Arc::new_cyclic(|weak| {
            let sink: Arc<dyn PositionSink> = Arc::new(TrackerSink {
                tracker: weak.clone(),
            });
            Self {
                selector: ProviderSelector::new(source, sink, params).with_criteria(criteria),
                pump: UpdatePump::new(Arc::clone(&registry), Arc::clone(&gateway)),
                registry,
                gateway,
            }
        })
    }

    /// Create a tracker that checkpoints as JSON files in the configured
    /// storage directory.
    pub fn from_config(config: &TrackerConfig, source: Arc<dyn PositionSource>) -> Arc<Self> {
        let store = Arc::new(FileStore::new(&config.storage.directory));
        let gateway = PersistenceGateway::new(
            store,
            Arc::new(JsonCodec),
            config.storage.registry_key.clone(),
            config.storage.position_key.clone(),
        );
        Self::with_criteria(
            source,
            gateway,
            config.subscription_params(),
            config.criteria(),
        )
    }

    /// Register `listener` under `name`, replacing any previous entry.
    ///
    /// The first listener starts tracking: the best provider is selected
    /// first, and if none is available the error is returned and the
    /// registry is left untouched. Later listeners are always registered;
    /// if tracking was lost meanwhile, selection is retried once and a
    /// failure only logged. The new listener then receives the active
    /// provider's last known fix (if any) before any pump delivery can reach
    /// it.
    pub fn add_listener(
        &self,
        name: impl Into<String>,
        listener: Arc<dyn PositionListener>,
    ) -> Result<(), TrackerError> {
        let name = name.into();
        let _gate = self.pump.exclusive();

        if self.registry.is_empty() {
            self.selector.select_best()?;
        } else if self.selector.active_provider().is_none() {
            if let Err(e) = self.selector.select_best() {
                warn!(
                    listener = %name,
                    error = %e,
                    "Registering listener while tracking is inactive"
                );
            }
        }

        if let Some(current) = self.selector.last_known_position() {
            if let Err(e) = invoke_isolated(|| listener.on_position_changed(&current)) {
                warn!(listener = %name, error = %e, "Listener failed to handle first position");
            }
        }

        self.registry.insert(name.clone(), listener);
        self.checkpoint_registry();

        info!(listener = %name, listeners = self.registry.len(), "Location listener added");
        Ok(())
    }

    /// Remove the listener registered under `name`.
    ///
    /// Returns false if there was none. Removing the last listener stops
    /// tracking.
    pub fn remove_listener(&self, name: &str) -> bool {
        let _gate = self.pump.exclusive();

        if !self.registry.remove(name) {
            debug!(listener = %name, "No such location listener");
            return false;
        }

        if self.registry.is_empty() {
            self.selector.deactivate();
        }
        self.checkpoint_registry();

        info!(listener = %name, listeners = self.registry.len(), "Location listener removed");
        true
    }

    pub fn get_listener(&self, name: &str) -> Option<Arc<dyn PositionListener>> {
        self.registry.get(name)
    }

    /// Snapshot of all live listeners.
    pub fn listeners(&self) -> HashMap<String, Arc<dyn PositionListener>> {
        self.registry.listeners()
    }

    /// Sorted names of live listeners.
    pub fn listener_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Sorted names of persisted listeners awaiting re-registration.
    pub fn dormant_names(&self) -> Vec<String> {
        self.registry.dormant_names()
    }

    pub fn active_provider(&self) -> Option<ProviderId> {
        self.selector.active_provider()
    }

    /// True while subscribed to a provider.
    pub fn is_tracking(&self) -> bool {
        self.active_provider().is_some()
    }

    /// Rebuild the registry from its checkpoint and resume tracking.
    ///
    /// Meant to run once at startup. Records `factory` cannot rebuild are kept
    /// dormant. If live listeners exist, the best provider is selected once
    /// and the restart delta is delivered as described for
    /// [`change_location_after_restart`](Self::change_location_after_restart).
    /// A missing provider is reported in the summary, not as a failure.
    pub fn restore(&self, factory: &dyn ListenerFactory) -> RestoreSummary {
        // Fixes arriving once the subscription is up must wait for the delta.
        let _gate = self.pump.exclusive();

        let counts = self
            .registry
            .restore(self.gateway.load_registry(), factory);

        let mut summary = RestoreSummary {
            restored: counts.restored,
            dormant: counts.dormant,
            ..Default::default()
        };

        if self.registry.is_empty() {
            info!(dormant = counts.dormant, "No location listeners to restore");
            return summary;
        }

        if let Err(e) = self.selector.select_best() {
            warn!(error = %e, "Cannot resume tracking after restart");
            summary.selection_error = Some(e);
        }
        summary.provider = self.selector.active_provider();
        summary.delta = self.deliver_restart_delta();

        info!(
            restored = summary.restored,
            dormant = summary.dormant,
            provider = ?summary.provider.as_ref().map(ProviderId::as_str),
            "Location listeners restored"
        );
        summary
    }

    /// Tell restored listeners how far the device moved while the process
    /// was not running.
    ///
    /// Every live listener gets exactly one
    /// [`on_position_delta`](PositionListener::on_position_delta) call with
    /// the checkpointed fix and the active provider's current fix, but only
    /// when a checkpointed fix exists. The current fix, when known, becomes
    /// the new checkpoint. If nothing is being tracked yet, one provider
    /// selection is attempted first.
    pub fn change_location_after_restart(&self) -> DeliveryReport {
        let _gate = self.pump.exclusive();

        if self.selector.active_provider().is_none() && !self.registry.is_empty() {
            if let Err(e) = self.selector.select_best() {
                debug!(error = %e, "No provider for restart position");
            }
        }
        self.deliver_restart_delta()
    }

    /// Restart delta against the current subscription. Caller holds the gate.
    fn deliver_restart_delta(&self) -> DeliveryReport {
        let Some(previous) = self.gateway.load_position() else {
            debug!("No position checkpoint, skipping restart delta");
            return DeliveryReport::default();
        };
        let current = self.selector.last_known_position();

        let report = self.pump.deliver_delta(&previous, current.as_ref());

        if let Some(current) = &current {
            info!(
                moved_m = format!("{:.1}", previous.distance_m(current)),
                listeners = report.attempted(),
                "Delivered position change since last run"
            );
            self.gateway.save_position(current);
        } else {
            info!(
                listeners = report.attempted(),
                "Delivered last position from previous run (no current fix)"
            );
        }
        report
    }

    /// Handle one event from the position source.
    ///
    /// Never fails: faults are logged and reflected in the outcome.
    pub fn handle_event(&self, event: SourceEvent) -> EventOutcome {
        match event {
            SourceEvent::PositionChanged(position) => self.position_changed(&position),
            SourceEvent::StatusChanged(provider) => {
                debug!(provider = %provider, "Provider status changed");
                self.reselect()
            }
            SourceEvent::ProviderEnabled(provider) => {
                debug!(provider = %provider, "Provider enabled");
                self.reselect()
            }
            SourceEvent::ProviderDisabled(provider) => {
                if self.selector.active_provider().as_ref() == Some(&provider) {
                    info!(provider = %provider, "Active provider disabled");
                    self.reselect()
                } else {
                    EventOutcome::Ignored
                }
            }
        }
    }

    /// Stop tracking and write a final registry checkpoint.
    ///
    /// Listeners stay registered and are restored on the next start.
    pub fn shutdown(&self) {
        let _gate = self.pump.exclusive();
        self.selector.deactivate();
        self.checkpoint_registry();
        info!(listeners = self.registry.len(), "Location tracker shut down");
    }

    fn position_changed(&self, position: &Position) -> EventOutcome {
        EventOutcome::Delivered(self.pump.deliver(position))
    }

    fn reselect(&self) -> EventOutcome {
        let _gate = self.pump.exclusive();

        if self.registry.is_empty() {
            return EventOutcome::Ignored;
        }

        match self.selector.select_best() {
            Ok(selection) => EventOutcome::Reselected(selection),
            Err(e) => {
                warn!(error = %e, "Location tracking inactive");
                EventOutcome::TrackingInactive(e)
            }
        }
    }

    fn checkpoint_registry(&self) {
        self.gateway.save_registry(&self.registry.records());
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.selector.deactivate();
    }
}

//! Update Pump - fans position fixes out to the listener registry.
//!
//! For every fix accepted by the active subscription the pump:
//!
//! 1. calls `on_position_changed` once on every live listener
//! 2. checkpoints the registry
//! 3. checkpoints the fix as the last known position
//!
//! A failing or panicking listener is logged and skipped; it never stops
//! delivery to the others nor the checkpoints. The source already filters by
//! time and distance, so the pump does not filter again.
//!
//! Deliveries and their checkpoints hold the delivery gate, a reentrant lock
//! the tracker also takes for registry mutations. A listener may therefore
//! call back into the tracker from inside its callback.

use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, warn};

use crate::listener::invoke_isolated;
use crate::persistence::PersistenceGateway;
use crate::position::Position;
use crate::registry::ListenerRegistry;

/// Outcome of one delivery round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Listeners whose callback returned successfully.
    pub delivered: usize,
    /// Listeners whose callback failed or panicked.
    pub failed: usize,
}

impl DeliveryReport {
    /// Listeners that were called.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Redistributes position events to registered listeners.
pub struct UpdatePump {
    registry: Arc<ListenerRegistry>,
    gateway: Arc<PersistenceGateway>,
    gate: ReentrantMutex<()>,
}

impl UpdatePump {
    pub fn new(registry: Arc<ListenerRegistry>, gateway: Arc<PersistenceGateway>) -> Self {
        Self {
            registry,
            gateway,
            gate: ReentrantMutex::new(()),
        }
    }

    /// Deliver a new fix to every listener, then checkpoint.
    pub fn deliver(&self, position: &Position) -> DeliveryReport {
        let _gate = self.gate.lock();
        let mut report = DeliveryReport::default();
        for (name, listener) in self.registry.snapshot() {
            match invoke_isolated(|| listener.on_position_changed(position)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(listener = %name, error = %e, "Listener failed to handle position update");
                }
            }
        }

        debug!(
            lat = format!("{:.5}", position.latitude()),
            lon = format!("{:.5}", position.longitude()),
            provider = %position.provider(),
            delivered = report.delivered,
            failed = report.failed,
            "Position update delivered"
        );

        self.gateway.save_registry(&self.registry.records());
        self.gateway.save_position(position);
        report
    }

    /// Deliver a restart delta to every listener. No checkpoint is written.
    pub fn deliver_delta(&self, previous: &Position, current: Option<&Position>) -> DeliveryReport {
        let _gate = self.gate.lock();
        let mut report = DeliveryReport::default();
        for (name, listener) in self.registry.snapshot() {
            match invoke_isolated(|| listener.on_position_delta(previous, current)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(listener = %name, error = %e, "Listener failed to handle position delta");
                }
            }
        }
        report
    }

    /// Hold off deliveries while the guard is alive.
    ///
    /// Reentrant on the calling thread.
    pub(crate) fn exclusive(&self) -> ReentrantMutexGuard<'_, ()> {
        self.gate.lock()
    }
}

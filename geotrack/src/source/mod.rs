//! Position source abstraction.
//!
//! The OS location service sits behind [`PositionSource`]. The tracker only
//! needs four capabilities from it:
//!
//! - pick the best provider for some [`Criteria`]
//! - subscribe a [`PositionSink`] to one provider with time/distance filtering
//! - cancel a subscription
//! - report a provider's last known fix
//!
//! Events flow back through the sink as [`SourceEvent`]s. The source never
//! delivers overlapping callbacks to the same sink.
//!
//! Deterministic implementations for tests and simulations live in
//! [`simulated`].

mod simulated;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::position::{Criteria, Position, ProviderId};

pub use simulated::{FlakySource, NoProviderSource, SimulatedSource};

/// Default minimum time between updates from a subscription (1 minute).
pub const DEFAULT_MIN_TIME: Duration = Duration::from_secs(60);

/// Default minimum distance between updates from a subscription (meters).
pub const DEFAULT_MIN_DISTANCE_M: f32 = 10.0;

/// Handle identifying one live subscription on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Filtering the source applies before it calls the sink.
///
/// Fixes closer in time than `min_time` or closer in space than
/// `min_distance_m` to the previous delivered fix are suppressed by the
/// source itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionParams {
    pub min_time: Duration,
    pub min_distance_m: f32,
}

impl Default for SubscriptionParams {
    fn default() -> Self {
        Self {
            min_time: DEFAULT_MIN_TIME,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

/// Events raised by a position source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A new fix passed the subscription filter.
    PositionChanged(Position),
    /// Delivery status of a provider changed (e.g. degraded).
    StatusChanged(ProviderId),
    /// A provider became available.
    ProviderEnabled(ProviderId),
    /// A provider was switched off.
    ProviderDisabled(ProviderId),
}

/// Errors reported by a position source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The provider is unknown or switched off.
    #[error("Provider {0} is unavailable")]
    Unavailable(ProviderId),

    /// The source refused the subscription.
    #[error("Failed to subscribe to {provider}: {reason}")]
    SubscribeFailed { provider: ProviderId, reason: String },
}

/// Receiver of events from a position source.
pub trait PositionSink: Send + Sync {
    fn on_event(&self, event: SourceEvent);
}

/// The OS-level location service.
pub trait PositionSource: Send + Sync {
    /// Best provider matching `criteria`, optionally restricted to enabled ones.
    fn best_provider(&self, criteria: &Criteria, require_enabled: bool) -> Option<ProviderId>;

    /// Start delivering events from `provider` to `sink`.
    fn subscribe(
        &self,
        provider: &ProviderId,
        params: SubscriptionParams,
        sink: Arc<dyn PositionSink>,
    ) -> Result<SubscriptionId, SourceError>;

    /// Stop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Most recent fix the provider knows about, if any.
    fn last_known_position(&self, provider: &ProviderId) -> Result<Option<Position>, SourceError>;
}

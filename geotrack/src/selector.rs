//! Provider Selector - keeps the tracker subscribed to the best provider.
//!
//! The selector owns the Active Provider State: at most one live
//! subscription on the [`PositionSource`]. Switching is atomic from the
//! pump's point of view: the old subscription is cancelled before the new
//! one is established, both under the same lock.
//!
//! Sources must not call the sink from inside `subscribe`/`unsubscribe`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::position::{Criteria, Position, ProviderId};
use crate::source::{PositionSink, PositionSource, SubscriptionId, SubscriptionParams};
use crate::tracker::TrackerError;

/// Result of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The best provider was already active.
    Unchanged(ProviderId),
    /// The subscription moved to a new provider.
    Switched {
        from: Option<ProviderId>,
        to: ProviderId,
    },
}

impl Selection {
    /// The provider active after the selection.
    pub fn provider(&self) -> &ProviderId {
        match self {
            Selection::Unchanged(provider) => provider,
            Selection::Switched { to, .. } => to,
        }
    }
}

#[derive(Debug)]
struct ActiveSubscription {
    provider: ProviderId,
    subscription: SubscriptionId,
}

/// Chooses the best provider and manages the single live subscription.
pub struct ProviderSelector {
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn PositionSink>,
    criteria: Criteria,
    params: SubscriptionParams,
    active: Mutex<Option<ActiveSubscription>>,
}

impl ProviderSelector {
    /// Create a selector that subscribes `sink` with `params`.
    pub fn new(
        source: Arc<dyn PositionSource>,
        sink: Arc<dyn PositionSink>,
        params: SubscriptionParams,
    ) -> Self {
        Self {
            source,
            sink,
            criteria: Criteria::default(),
            params,
            active: Mutex::new(None),
        }
    }

    /// Use different provider criteria.
    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn params(&self) -> SubscriptionParams {
        self.params
    }

    /// Currently subscribed provider.
    pub fn active_provider(&self) -> Option<ProviderId> {
        self.active.lock().as_ref().map(|a| a.provider.clone())
    }

    /// Query the source for the best enabled provider and subscribe to it.
    ///
    /// When no provider qualifies the current subscription is torn down and
    /// [`TrackerError::NoProviderAvailable`] is returned; nothing is retried.
    pub fn select_best(&self) -> Result<Selection, TrackerError> {
        let mut active = self.active.lock();

        let Some(best) = self.source.best_provider(&self.criteria, true) else {
            if let Some(previous) = active.take() {
                self.source.unsubscribe(previous.subscription);
                warn!(provider = %previous.provider, "No provider available, tracking stopped");
            } else {
                debug!("No provider available");
            }
            return Err(TrackerError::NoProviderAvailable);
        };

        if let Some(current) = active.as_ref() {
            if current.provider == best {
                return Ok(Selection::Unchanged(best));
            }
        }

        let from = active.take().map(|previous| {
            self.source.unsubscribe(previous.subscription);
            previous.provider
        });

        let subscription = self
            .source
            .subscribe(&best, self.params, Arc::clone(&self.sink))?;

        info!(
            from = ?from.as_ref().map(ProviderId::as_str),
            to = %best,
            %subscription,
            min_time = ?self.params.min_time,
            min_distance_m = self.params.min_distance_m,
            "Listening to position provider"
        );

        *active = Some(ActiveSubscription {
            provider: best.clone(),
            subscription,
        });
        Ok(Selection::Switched { from, to: best })
    }

    /// Cancel the live subscription, if any. Returns the provider it was on.
    pub fn deactivate(&self) -> Option<ProviderId> {
        let previous = self.active.lock().take()?;
        self.source.unsubscribe(previous.subscription);
        info!(provider = %previous.provider, "Stopped listening to position provider");
        Some(previous.provider)
    }

    /// Last known fix of the active provider.
    ///
    /// Best effort: no active provider or a source error both yield `None`.
    pub fn last_known_position(&self) -> Option<Position> {
        let provider = self.active_provider()?;
        match self.source.last_known_position(&provider) {
            Ok(position) => position,
            Err(e) => {
                debug!(provider = %provider, error = %e, "Last known position unavailable");
                None
            }
        }
    }
}
